//! Transport- and format-agnostic RPC core.
//!
//! Calls travel as self-contained messages tagged with one of nine wire
//! kinds. Typed values cross the serialization boundary through a
//! compile-time visitor ([`Visit`]/[`Visitor`]); a [`SerialAdapter`] supplies
//! one concrete wire format, and [`Transport`] supplies one way of moving the
//! resulting bytes. Ships with a self-describing JSON adapter, a compact
//! positional binary adapter, an in-process channel transport, and a framed
//! TCP transport.
//!
//! ```no_run
//! use wirecall::adapters::json::JsonAdapter;
//! use wirecall::transport::channel::ChannelTransport;
//! use wirecall::{RpcClient, RpcServer};
//!
//! let (client_end, mut server_end) = ChannelTransport::pair();
//!
//! let mut server = RpcServer::<JsonAdapter>::new();
//! server.bind("Sum", |(a, b): &mut (i64, i64)| *a + *b);
//!
//! std::thread::spawn(move || loop {
//!     use wirecall::Transport;
//!     let Ok(request) = server_end.receive() else { break };
//!     let response = server.dispatch(&request);
//!     if server_end.send(&response).is_err() {
//!         break;
//!     }
//! });
//!
//! let mut client = RpcClient::<JsonAdapter, _>::new(client_end);
//! let sum: i64 = client.call_func("Sum", (1i64, 2i64)).unwrap();
//! assert_eq!(sum, 3);
//! ```

pub mod adapter;
pub mod adapters;
pub mod client;
mod dispatcher;
pub mod envelope;
pub mod error;
pub mod server;
pub mod transport;
pub mod visit;

pub use adapter::SerialAdapter;
pub use client::{CallbackHandle, RpcClient};
pub use envelope::{RpcKind, RpcObject};
pub use error::{ExceptionKind, RpcError};
pub use server::{CallContext, RpcServer};
pub use transport::{CallbackChannel, NoCallbacks, Transport, TransportChannel};
pub use visit::{MultiMap, Serializable, TupleShape, Visit, Visitor};
