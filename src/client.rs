//! Client side: typed calls, by-reference argument rebinding, and the local
//! half of callback negotiation.

use std::collections::HashMap;
use std::marker::PhantomData;

use tracing::debug;

use crate::adapter::SerialAdapter;
use crate::dispatcher::{error_bytes, exec_into_reply};
use crate::envelope::{InstallRequest, Request, RpcKind, RpcObject};
use crate::error::RpcError;
use crate::transport::Transport;
use crate::visit::{TupleShape, Visit};

type CallbackThunk<S> = Box<dyn FnMut(&RpcObject<S>) -> Vec<u8> + Send>;

/// Proof that a callback was installed; pass it back to
/// [`RpcClient::uninstall_callback`] to revoke it.
#[derive(Debug)]
pub struct CallbackHandle {
    func_name: String,
}

impl CallbackHandle {
    pub fn func_name(&self) -> &str {
        &self.func_name
    }
}

/// Issues calls over a blocking [`Transport`].
///
/// While a call is outstanding, inbound `CallbackRequest` messages are
/// serviced inline by the receive loop, so a server handler can call back
/// into this client before the original call completes.
pub struct RpcClient<S: SerialAdapter, T: Transport> {
    transport: T,
    callbacks: HashMap<String, CallbackThunk<S>>,
    _adapter: PhantomData<fn() -> S>,
}

impl<S: SerialAdapter, T: Transport> RpcClient<S, T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            callbacks: HashMap::new(),
            _adapter: PhantomData,
        }
    }

    /// Calls a remote function and decodes its result.
    pub fn call_func<R, A>(&mut self, func_name: &str, args: A) -> Result<R, RpcError>
    where
        R: Visit + Default,
        A: TupleShape,
    {
        let request = RpcObject::<S>::of_request(Request {
            is_callback: false,
            func_name: func_name.to_owned(),
            bind_args: false,
            args,
        })?;
        self.send_object(&request)?;
        let response = self.receive_response()?;
        match response.kind()? {
            RpcKind::FuncResult | RpcKind::FuncResultWithBind | RpcKind::FuncError => {
                response.get_result()
            }
            kind => Err(RpcError::KindMismatch(format!(
                "expected a call response, got {kind:?}"
            ))),
        }
    }

    /// Calls a remote function whose signature takes arguments by reference:
    /// on success `args` is overwritten with the values the remote handler
    /// left behind.
    pub fn call_func_w_bind<R, A>(&mut self, func_name: &str, args: &mut A) -> Result<R, RpcError>
    where
        R: Visit + Default,
        A: TupleShape + Clone,
    {
        let request = RpcObject::<S>::of_request(Request {
            is_callback: false,
            func_name: func_name.to_owned(),
            bind_args: true,
            args: args.clone(),
        })?;
        self.send_object(&request)?;
        let response = self.receive_response()?;
        match response.kind()? {
            RpcKind::FuncResultWithBind => {
                let result = response.get_result()?;
                *args = response.get_args()?;
                Ok(result)
            }
            RpcKind::FuncResult | RpcKind::FuncError => response.get_result(),
            kind => Err(RpcError::KindMismatch(format!(
                "expected a call response, got {kind:?}"
            ))),
        }
    }

    /// Registers a local function the server may invoke for the lifetime of
    /// this connection. Fails if the name is taken on either end.
    pub fn install_callback<A, R, F>(
        &mut self,
        func_name: &str,
        mut func: F,
    ) -> Result<CallbackHandle, RpcError>
    where
        A: TupleShape,
        R: Visit + Default,
        F: FnMut(&mut A) -> R + Send + 'static,
    {
        self.install_thunk(
            func_name,
            Box::new(move |obj| run_callback::<S, A, R>(obj, |args| Ok(func(args)))),
        )
    }

    /// Fallible flavor of [`RpcClient::install_callback`]; an `Err` is
    /// relayed to the server as a remote execution failure.
    pub fn install_callback_try<A, R, F>(
        &mut self,
        func_name: &str,
        mut func: F,
    ) -> Result<CallbackHandle, RpcError>
    where
        A: TupleShape,
        R: Visit + Default,
        F: FnMut(&mut A) -> Result<R, String> + Send + 'static,
    {
        self.install_thunk(
            func_name,
            Box::new(move |obj| {
                run_callback::<S, A, R>(obj, |args| func(args).map_err(RpcError::RemoteExec))
            }),
        )
    }

    fn install_thunk(
        &mut self,
        func_name: &str,
        thunk: CallbackThunk<S>,
    ) -> Result<CallbackHandle, RpcError> {
        if self.callbacks.contains_key(func_name) {
            return Err(RpcError::CallbackInstall(format!(
                "callback \"{func_name}\" is already installed"
            )));
        }
        self.callbacks.insert(func_name.to_owned(), thunk);
        match self.negotiate(func_name, false) {
            Ok(()) => Ok(CallbackHandle { func_name: func_name.to_owned() }),
            Err(err) => {
                self.callbacks.remove(func_name);
                Err(err)
            }
        }
    }

    /// Revokes a callback on both ends.
    pub fn uninstall_callback(&mut self, handle: CallbackHandle) -> Result<(), RpcError> {
        self.negotiate(&handle.func_name, true)?;
        self.callbacks.remove(&handle.func_name);
        Ok(())
    }

    /// Whether a callback is installed locally under `name`.
    pub fn has_callback(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    /// Runs the install handshake. The server acknowledges by echoing the
    /// install request back; anything else is a failed negotiation.
    fn negotiate(&mut self, func_name: &str, is_uninstall: bool) -> Result<(), RpcError> {
        let request = RpcObject::<S>::of_install(InstallRequest {
            func_name: func_name.to_owned(),
            is_uninstall,
        })?;
        self.send_object(&request)?;
        let response = self.receive_response()?;
        match response.kind()? {
            RpcKind::CallbackInstallRequest
                if response.func_name()? == func_name
                    && response.is_callback_uninstall()? == is_uninstall =>
            {
                debug!(%func_name, is_uninstall, "callback negotiation acknowledged");
                Ok(())
            }
            RpcKind::CallbackError => Err(RpcError::with_kind(
                response.get_error_kind()?,
                response.get_error_mesg()?,
            )),
            _ => Err(RpcError::CallbackInstall(
                "server did not acknowledge the callback negotiation".into(),
            )),
        }
    }

    fn send_object(&mut self, obj: &RpcObject<S>) -> Result<(), RpcError> {
        let bytes = obj.to_bytes()?;
        self.transport
            .send(&bytes)
            .map_err(|err| RpcError::ClientSend(err.to_string()))
    }

    /// Receives until a message addressed to this client's pending exchange
    /// arrives, servicing inbound callback requests along the way.
    fn receive_response(&mut self) -> Result<RpcObject<S>, RpcError> {
        loop {
            let raw = self
                .transport
                .receive()
                .map_err(|err| RpcError::ClientReceive(err.to_string()))?;
            let obj = RpcObject::<S>::parse_bytes(&raw)
                .ok_or_else(|| RpcError::ClientReceive("invalid RPC object received".into()))?;
            match obj.kind()? {
                RpcKind::CallbackRequest => {
                    let reply = self.serve_callback(&obj);
                    self.transport
                        .send(&reply)
                        .map_err(|err| RpcError::ClientSend(err.to_string()))?;
                }
                _ => return Ok(obj),
            }
        }
    }

    fn serve_callback(&mut self, obj: &RpcObject<S>) -> Vec<u8> {
        let name = obj.func_name().unwrap_or_default();
        match self.callbacks.get_mut(&name) {
            Some(thunk) => thunk(obj),
            None => {
                let err = RpcError::FunctionNotFound(format!(
                    "RPC error: called function: \"{name}\" not found"
                ));
                error_bytes::<S>(true, &name, &err)
            }
        }
    }
}

fn run_callback<S, A, R>(
    obj: &RpcObject<S>,
    run: impl FnOnce(&mut A) -> Result<R, RpcError>,
) -> Vec<u8>
where
    S: SerialAdapter,
    A: TupleShape,
    R: Visit + Default,
{
    let name = obj.func_name().unwrap_or_default();
    match exec_into_reply::<S, A, R>(obj, run).and_then(|reply| reply.to_bytes()) {
        Ok(bytes) => bytes,
        Err(err) => error_bytes::<S>(true, &name, &err),
    }
}
