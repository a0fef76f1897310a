use crate::{Context, Result};

/// Introspection of the server's dispatch table.
#[power_macro::service]
pub trait MetaService {
    async fn list_methods(&self, ctx: &Context, req: &()) -> Result<Vec<String>>;
    async fn list_services(&self, ctx: &Context, req: &()) -> Result<Vec<String>>;
}

impl MetaService for () {
    async fn list_methods(&self, ctx: &Context, (): &()) -> Result<Vec<String>> {
        let mut methods: Vec<String> = ctx.state.router.method_names().cloned().collect();
        methods.sort();
        Ok(methods)
    }

    async fn list_services(&self, ctx: &Context, (): &()) -> Result<Vec<String>> {
        Ok(ctx
            .state
            .router
            .service_names()
            .into_iter()
            .map(str::to_string)
            .collect())
    }
}
