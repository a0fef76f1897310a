use serde::{Deserialize, Serialize};
use serde_inline_default::serde_inline_default;
use std::time::Duration;

use crate::{
    context::{Context, SocketEndpoint},
    error::{Error, ErrorKind},
    msg::{MsgFlags, MsgMeta},
};

/// Calls remote methods. Every `#[service]` trait is implemented for it.
#[serde_inline_default]
#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone)]
pub struct Client {
    #[serde_inline_default(Duration::from_secs(1))]
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    #[serde_inline_default(true)]
    pub use_msgpack: bool,
}

impl Default for Client {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(1),
            use_msgpack: true,
        }
    }
}

impl Client {
    /// Sends `req` to `method_name` on the context's endpoint and waits for
    /// the response.
    ///
    /// # Errors
    ///
    /// Transport failures, `Timeout`, or the error returned by the remote
    /// method.
    pub async fn power_request<Req, Rsp, E>(
        &self,
        ctx: &Context,
        req: &Req,
        method_name: &str,
    ) -> std::result::Result<Rsp, E>
    where
        Req: Serialize,
        Rsp: for<'c> Deserialize<'c>,
        E: std::error::Error + From<Error> + for<'c> Deserialize<'c>,
    {
        let socket = match &ctx.endpoint {
            SocketEndpoint::Invalid => {
                return Err(Error::new(
                    ErrorKind::InvalidArgument,
                    "client context without address".to_string(),
                )
                .into());
            }
            SocketEndpoint::Connected(socket) => socket.clone(),
            SocketEndpoint::Address(addr) => {
                ctx.state.socket_pool.acquire(addr, &ctx.state).await?
            }
        };

        let mut flags = MsgFlags::IsReq;
        if self.use_msgpack {
            flags |= MsgFlags::UseMessagePack;
        }
        let mut meta = MsgMeta {
            method: method_name.into(),
            flags,
            msgid: 0,
        };
        let Some(receiver) = socket.send(&mut meta, req, &ctx.state.waiter).await? else {
            return Err(Error::kind(ErrorKind::InvalidArgument).into());
        };

        match tokio::time::timeout(self.timeout, receiver.recv()).await {
            Ok(msg) => msg?.deserialize()?,
            Err(_) => Err(Error::new(
                ErrorKind::Timeout,
                format!("{method_name} timed out after {:?}", self.timeout),
            )
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let client = Client::default();
        assert_eq!(client.timeout, Duration::from_secs(1));
        assert!(client.use_msgpack);

        let client: Client = serde_json::from_str(r#"{"timeout": "250ms"}"#).unwrap();
        assert_eq!(client.timeout, Duration::from_millis(250));
        assert!(client.use_msgpack);
    }
}
