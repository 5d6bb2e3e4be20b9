//! Server side: handler registration, byte-level dispatch, result caching,
//! and the callback registry.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use tracing::debug;

use crate::adapter::SerialAdapter;
use crate::dispatcher::{error_bytes, exec_into_reply, Binding, DispatchTable, ResultCache, Thunk};
use crate::envelope::{Request, RpcKind, RpcObject};
use crate::error::RpcError;
use crate::transport::{CallbackChannel, NoCallbacks};
use crate::visit::{TupleShape, Visit};

/// Dispatches serialized requests to registered handlers.
///
/// The server is transport-agnostic: feed it one request's bytes through
/// [`RpcServer::dispatch`] (or [`RpcServer::dispatch_with`] when callbacks
/// need a channel back to the client) and send back whatever bytes come out.
/// Dispatch is total: every failure is reported as an error envelope rather
/// than an `Err`.
pub struct RpcServer<S: SerialAdapter> {
    bindings: DispatchTable<S>,
    cache: ResultCache,
    callbacks: HashSet<String>,
}

impl<S: SerialAdapter> Default for RpcServer<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: SerialAdapter> RpcServer<S> {
    pub fn new() -> Self {
        Self {
            bindings: DispatchTable::default(),
            cache: HashMap::new(),
            callbacks: HashSet::new(),
        }
    }

    /// Registers an infallible handler.
    pub fn bind<A, R, F>(&mut self, name: impl Into<String>, func: F)
    where
        A: TupleShape,
        R: Visit + Default,
        F: Fn(&mut A) -> R + Send + 'static,
    {
        self.bind_with_context(name, move |_ctx, args| Ok(func(args)));
    }

    /// Registers a fallible handler; an `Err` is relayed to the caller as a
    /// remote execution failure carrying the message.
    pub fn bind_try<A, R, F>(&mut self, name: impl Into<String>, func: F)
    where
        A: TupleShape,
        R: Visit + Default,
        F: Fn(&mut A) -> Result<R, String> + Send + 'static,
    {
        self.bind_with_context(name, move |_ctx, args| {
            func(args).map_err(RpcError::RemoteExec)
        });
    }

    /// Like [`RpcServer::bind`], but successful responses are memoized by
    /// request bytes. Only bind pure functions this way.
    pub fn bind_cached<A, R, F>(&mut self, name: impl Into<String>, func: F)
    where
        A: TupleShape,
        R: Visit + Default,
        F: Fn(&mut A) -> R + Send + 'static,
    {
        let name = name.into();
        self.insert_binding(name, true, move |_ctx, args| Ok(func(args)));
    }

    /// Registers a handler that can reach back into the client through
    /// [`CallContext`], e.g. to invoke an installed callback mid-call.
    pub fn bind_with_context<A, R, F>(&mut self, name: impl Into<String>, func: F)
    where
        A: TupleShape,
        R: Visit + Default,
        F: Fn(&mut CallContext<'_, S>, &mut A) -> Result<R, RpcError> + Send + 'static,
    {
        self.insert_binding(name.into(), false, func);
    }

    fn insert_binding<A, R, F>(&mut self, name: String, cached: bool, func: F)
    where
        A: TupleShape,
        R: Visit + Default,
        F: Fn(&mut CallContext<'_, S>, &mut A) -> Result<R, RpcError> + Send + 'static,
    {
        let thunk: Thunk<S> = Box::new(move |ctx, obj| {
            match exec_into_reply::<S, A, R>(obj, |args| func(ctx, args)) {
                Ok(reply) => reply,
                Err(err) => error_object(obj, &err),
            }
        });
        self.bindings.insert(name, Binding { thunk, cached });
    }

    pub fn unbind(&mut self, name: &str) -> bool {
        self.cache.remove(name);
        self.bindings.remove(name)
    }

    /// Drops memoized responses for one function.
    pub fn clear_cache(&mut self, name: &str) {
        self.cache.remove(name);
    }

    /// Drops all memoized responses.
    pub fn clear_all_caches(&mut self) {
        self.cache.clear();
    }

    /// Handles one request with no way back to the client; a handler that
    /// tries to invoke a callback gets [`RpcError::CallbackMissing`].
    pub fn dispatch(&mut self, bytes: &[u8]) -> Vec<u8> {
        self.dispatch_with(&mut NoCallbacks, bytes)
    }

    /// Handles one request. `channel` carries nested callback exchanges back
    /// to the client while the handler runs.
    pub fn dispatch_with(&mut self, channel: &mut dyn CallbackChannel, bytes: &[u8]) -> Vec<u8> {
        let Some(obj) = RpcObject::<S>::parse_bytes(bytes) else {
            let err = RpcError::ServerReceive("invalid RPC object received".into());
            return error_bytes::<S>(false, "", &err);
        };
        match obj.kind() {
            Ok(RpcKind::FuncRequest) => self.run_request(channel, &obj, bytes),
            Ok(RpcKind::CallbackInstallRequest) => self.handle_install(&obj, bytes),
            Ok(kind) => {
                let name = obj.func_name().unwrap_or_default();
                let err = RpcError::KindMismatch(format!(
                    "server cannot handle a {kind:?} message"
                ));
                error_bytes::<S>(kind.is_callback(), &name, &err)
            }
            Err(err) => error_bytes::<S>(false, "", &err),
        }
    }

    fn run_request(
        &mut self,
        channel: &mut dyn CallbackChannel,
        obj: &RpcObject<S>,
        bytes: &[u8],
    ) -> Vec<u8> {
        let name = match obj.func_name() {
            Ok(name) => name,
            Err(err) => return error_bytes::<S>(false, "", &err),
        };
        let Some(binding) = self.bindings.get(&name) else {
            let err = RpcError::FunctionNotFound(format!(
                "RPC error: called function: \"{name}\" not found"
            ));
            return error_bytes::<S>(false, &name, &err);
        };
        if binding.cached {
            if let Some(hit) = self.cache.get(&name).and_then(|memo| memo.get(bytes)) {
                debug!(func_name = %name, "serving cached result");
                return hit.clone();
            }
        }

        let mut ctx = CallContext {
            channel,
            callbacks: &self.callbacks,
            _adapter: PhantomData,
        };
        let reply = (binding.thunk)(&mut ctx, obj);
        let response = match reply.to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => return error_bytes::<S>(false, &name, &err),
        };
        if binding.cached && !reply.is_error() {
            self.cache
                .entry(name)
                .or_default()
                .insert(bytes.to_vec(), response.clone());
        }
        response
    }

    /// Acknowledges an install by echoing the request back; a duplicate
    /// install is rejected in-band.
    fn handle_install(&mut self, obj: &RpcObject<S>, bytes: &[u8]) -> Vec<u8> {
        let name = match obj.func_name() {
            Ok(name) => name,
            Err(err) => return error_bytes::<S>(true, "", &err),
        };
        match obj.is_callback_uninstall() {
            Ok(true) => {
                self.callbacks.remove(&name);
                bytes.to_vec()
            }
            Ok(false) => {
                if self.callbacks.insert(name.clone()) {
                    bytes.to_vec()
                } else {
                    let err = RpcError::CallbackInstall(format!(
                        "callback \"{name}\" is already installed"
                    ));
                    error_bytes::<S>(true, &name, &err)
                }
            }
            Err(err) => error_bytes::<S>(true, &name, &err),
        }
    }

    /// Whether a client has installed a callback under `name`.
    pub fn has_callback(&self, name: &str) -> bool {
        self.callbacks.contains(name)
    }
}

fn error_object<S: SerialAdapter>(request: &RpcObject<S>, err: &RpcError) -> RpcObject<S> {
    let is_callback = request.kind().map(RpcKind::is_callback).unwrap_or(false);
    let name = request.func_name().unwrap_or_default();
    let reply = crate::envelope::ErrorReply::new(is_callback, name, err);
    // An error envelope only holds two strings and two integers; if building
    // one fails the adapter itself is broken and dispatch falls back to an
    // empty response.
    RpcObject::of_error(reply).unwrap_or_else(|_| {
        RpcObject::of_error(crate::envelope::ErrorReply::default())
            .expect("default error envelope must serialize")
    })
}

/// Handler-side view of the connection while one request is being served.
///
/// Lets a handler invoke callbacks the client installed earlier. The exchange
/// is nested inside the client's pending call: the client notices the inbound
/// callback request while waiting for its own result, serves it, and the
/// server resumes the handler with the callback's result.
pub struct CallContext<'a, S: SerialAdapter> {
    pub(crate) channel: &'a mut dyn CallbackChannel,
    pub(crate) callbacks: &'a HashSet<String>,
    pub(crate) _adapter: PhantomData<fn() -> S>,
}

impl<S: SerialAdapter> CallContext<'_, S> {
    /// Invokes a client-installed callback and waits for its result.
    pub fn call_callback<R, A>(&mut self, name: &str, args: A) -> Result<R, RpcError>
    where
        R: Visit + Default,
        A: TupleShape,
    {
        let response = self.exchange_callback(name, args, false)?;
        response.get_result()
    }

    /// Like [`CallContext::call_callback`], but also rebinds `args` to the
    /// argument values the callback left behind.
    pub fn call_callback_w_bind<R, A>(&mut self, name: &str, args: &mut A) -> Result<R, RpcError>
    where
        R: Visit + Default,
        A: TupleShape + Clone,
    {
        let response = self.exchange_callback(name, args.clone(), true)?;
        let result = response.get_result()?;
        *args = response.get_args()?;
        Ok(result)
    }

    fn exchange_callback<A: TupleShape>(
        &mut self,
        name: &str,
        args: A,
        bind_args: bool,
    ) -> Result<RpcObject<S>, RpcError> {
        if !self.callbacks.contains(name) {
            return Err(RpcError::CallbackMissing(format!(
                "callback \"{name}\" is not installed"
            )));
        }
        let request = RpcObject::<S>::of_request(Request {
            is_callback: true,
            func_name: name.to_owned(),
            bind_args,
            args,
        })?;
        let raw = self.channel.exchange(&request.to_bytes()?)?;
        let response = RpcObject::<S>::parse_bytes(&raw)
            .ok_or_else(|| RpcError::ServerReceive("invalid RPC object received".into()))?;
        match response.kind()? {
            RpcKind::CallbackResult | RpcKind::CallbackResultWithBind | RpcKind::CallbackError => {
                Ok(response)
            }
            kind => Err(RpcError::KindMismatch(format!(
                "expected a callback response, got {kind:?}"
            ))),
        }
    }
}
