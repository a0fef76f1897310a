//! Framed TCP transport.
//!
//! Frame layout, all integers big-endian:
//!
//! ```text
//! | 4 bytes | 4 bytes   | body      |
//! | "PWR!"  | body len  | see Message::parse |
//! ```

const MAGIC_NUM: u32 = u32::from_be_bytes(*b"PWR!");
const MAX_MSG_SIZE: usize = 64 << 20;

mod tcp_socket;
pub use tcp_socket::TcpSocket;

mod tcp_socket_pool;
pub use tcp_socket_pool::TcpSocketPool;
