//! Name-keyed table of type-erased handler thunks.
//!
//! Each `bind_*` call on the server closes over a typed handler and stores a
//! boxed thunk that decodes the argument tuple, runs the handler, and encodes
//! the reply. All typed work happens inside the thunk; the dispatch loop only
//! ever sees [`RpcObject`]s.

use std::collections::HashMap;

use crate::adapter::SerialAdapter;
use crate::envelope::{ErrorReply, Reply, ReplyWithBind, RpcObject};
use crate::error::RpcError;
use crate::server::CallContext;
use crate::visit::{TupleShape, Visit};

pub(crate) type Thunk<S> =
    Box<dyn Fn(&mut CallContext<'_, S>, &RpcObject<S>) -> RpcObject<S> + Send>;

pub(crate) struct Binding<S: SerialAdapter> {
    pub thunk: Thunk<S>,
    /// Whether successful responses are memoized by request bytes.
    pub cached: bool,
}

/// Name-keyed handler table. Binding a name twice is last-writer-wins.
pub(crate) struct DispatchTable<S: SerialAdapter> {
    bindings: HashMap<String, Binding<S>>,
}

impl<S: SerialAdapter> Default for DispatchTable<S> {
    fn default() -> Self {
        Self { bindings: HashMap::new() }
    }
}

impl<S: SerialAdapter> DispatchTable<S> {
    pub fn insert(&mut self, name: String, binding: Binding<S>) {
        self.bindings.insert(name, binding);
    }

    pub fn get(&self, name: &str) -> Option<&Binding<S>> {
        self.bindings.get(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.bindings.remove(name).is_some()
    }
}

/// Per-function memo of request bytes to response bytes.
pub(crate) type ResultCache = HashMap<String, HashMap<Vec<u8>, Vec<u8>>>;

/// Decodes the request's arguments, runs the handler, and builds the matching
/// reply. A request sent with `bind_args` gets its post-call argument values
/// echoed back in a `*ResultWithBind`; otherwise the arguments are dropped
/// and a plain `*Result` goes out.
pub(crate) fn exec_into_reply<S, A, R>(
    obj: &RpcObject<S>,
    run: impl FnOnce(&mut A) -> Result<R, RpcError>,
) -> Result<RpcObject<S>, RpcError>
where
    S: SerialAdapter,
    A: TupleShape,
    R: Visit + Default,
{
    let func_name = obj.func_name()?;
    let is_callback = obj.kind()?.is_callback();
    let bind = obj.has_bound_args()?;
    let mut args: A = obj.get_args()?;
    let result = run(&mut args)?;
    if bind {
        RpcObject::of_reply_with_bind(ReplyWithBind { is_callback, func_name, result, args })
    } else {
        RpcObject::of_reply(Reply { is_callback, func_name, result })
    }
}

/// Encodes an error envelope, falling back to an empty buffer when even the
/// envelope cannot be serialized.
pub(crate) fn error_bytes<S: SerialAdapter>(
    is_callback: bool,
    func_name: &str,
    err: &RpcError,
) -> Vec<u8> {
    let reply = ErrorReply::new(is_callback, func_name, err);
    match RpcObject::<S>::of_error(reply).and_then(|obj| obj.to_bytes()) {
        Ok(bytes) => bytes,
        Err(ser_err) => {
            tracing::error!(%func_name, error = %ser_err, "could not serialize error reply");
            Vec::new()
        }
    }
}
