//! The message envelope: the nine wire kinds, the typed message structs they
//! carry, and [`RpcObject`], the serialized form a call travels as.

use crate::adapter::SerialAdapter;
use crate::error::{ExceptionKind, RpcError};
use crate::visit::{TupleShape, Visit, Visitor};

/// Wire kind codes. The discriminants are the on-wire `type` field and the
/// ordering is fixed by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcKind {
    CallbackInstallRequest = 0,
    CallbackError = 1,
    CallbackRequest = 2,
    CallbackResult = 3,
    CallbackResultWithBind = 4,
    FuncError = 5,
    FuncRequest = 6,
    FuncResult = 7,
    FuncResultWithBind = 8,
}

impl RpcKind {
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Rejects unrecognized kind codes.
    pub fn from_code(code: i64) -> Result<Self, RpcError> {
        Ok(match code {
            0 => Self::CallbackInstallRequest,
            1 => Self::CallbackError,
            2 => Self::CallbackRequest,
            3 => Self::CallbackResult,
            4 => Self::CallbackResultWithBind,
            5 => Self::FuncError,
            6 => Self::FuncRequest,
            7 => Self::FuncResult,
            8 => Self::FuncResultWithBind,
            other => {
                return Err(RpcError::Deserialization(format!(
                    "unrecognized rpc kind code: {other}"
                )))
            }
        })
    }

    /// Whether this kind travels server-to-client (a callback) rather than
    /// client-to-server.
    pub fn is_callback(self) -> bool {
        matches!(
            self,
            Self::CallbackInstallRequest
                | Self::CallbackError
                | Self::CallbackRequest
                | Self::CallbackResult
                | Self::CallbackResultWithBind
        )
    }
}

/// A call request: `FuncRequest` or `CallbackRequest`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request<A> {
    pub is_callback: bool,
    pub func_name: String,
    pub bind_args: bool,
    pub args: A,
}

impl<A: TupleShape> Request<A> {
    pub fn kind(&self) -> RpcKind {
        if self.is_callback {
            RpcKind::CallbackRequest
        } else {
            RpcKind::FuncRequest
        }
    }

    pub fn visit_fields<V: Visitor>(&mut self, vis: &mut V) -> Result<(), RpcError> {
        let mut code = self.kind().code();
        vis.as_int("type", &mut code)?;
        self.is_callback = RpcKind::from_code(code)?.is_callback();
        vis.as_string("func_name", &mut self.func_name)?;
        vis.as_bool("bind_args", &mut self.bind_args)?;
        vis.as_tuple("args", &mut self.args)
    }
}

/// A successful result without rebound arguments: `FuncResult` or
/// `CallbackResult`. A unit result is omitted from the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reply<R> {
    pub is_callback: bool,
    pub func_name: String,
    pub result: R,
}

impl<R: Visit> Reply<R> {
    pub fn kind(&self) -> RpcKind {
        if self.is_callback {
            RpcKind::CallbackResult
        } else {
            RpcKind::FuncResult
        }
    }

    pub fn visit_fields<V: Visitor>(&mut self, vis: &mut V) -> Result<(), RpcError> {
        let mut code = self.kind().code();
        vis.as_int("type", &mut code)?;
        self.is_callback = RpcKind::from_code(code)?.is_callback();
        vis.as_string("func_name", &mut self.func_name)?;
        if !R::IS_UNIT {
            self.result.visit("result", vis)?;
        }
        Ok(())
    }
}

/// A successful result carrying the post-call argument values, used to
/// propagate by-reference mutation back to the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyWithBind<R, A> {
    pub is_callback: bool,
    pub func_name: String,
    pub result: R,
    pub args: A,
}

impl<R: Visit, A: TupleShape> ReplyWithBind<R, A> {
    pub fn kind(&self) -> RpcKind {
        if self.is_callback {
            RpcKind::CallbackResultWithBind
        } else {
            RpcKind::FuncResultWithBind
        }
    }

    pub fn visit_fields<V: Visitor>(&mut self, vis: &mut V) -> Result<(), RpcError> {
        let mut code = self.kind().code();
        vis.as_int("type", &mut code)?;
        self.is_callback = RpcKind::from_code(code)?.is_callback();
        vis.as_string("func_name", &mut self.func_name)?;
        let mut bind_args = true;
        vis.as_bool("bind_args", &mut bind_args)?;
        vis.as_tuple("args", &mut self.args)?;
        if !R::IS_UNIT {
            self.result.visit("result", vis)?;
        }
        Ok(())
    }
}

/// A relayed failure: `FuncError` or `CallbackError`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorReply {
    pub is_callback: bool,
    pub func_name: String,
    pub except_kind: ExceptionKind,
    pub err_mesg: String,
}

impl ErrorReply {
    pub fn new(is_callback: bool, func_name: impl Into<String>, err: &RpcError) -> Self {
        Self {
            is_callback,
            func_name: func_name.into(),
            except_kind: err.kind(),
            err_mesg: err.message().to_owned(),
        }
    }

    pub fn kind(&self) -> RpcKind {
        if self.is_callback {
            RpcKind::CallbackError
        } else {
            RpcKind::FuncError
        }
    }

    pub fn visit_fields<V: Visitor>(&mut self, vis: &mut V) -> Result<(), RpcError> {
        let mut code = self.kind().code();
        vis.as_int("type", &mut code)?;
        self.is_callback = RpcKind::from_code(code)?.is_callback();
        vis.as_string("func_name", &mut self.func_name)?;
        let mut except_code = self.except_kind.code();
        vis.as_int("except_type", &mut except_code)?;
        self.except_kind = ExceptionKind::from_code(except_code);
        vis.as_string("err_mesg", &mut self.err_mesg)
    }
}

/// Callback install/uninstall handshake message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallRequest {
    pub func_name: String,
    pub is_uninstall: bool,
}

impl InstallRequest {
    pub fn kind(&self) -> RpcKind {
        RpcKind::CallbackInstallRequest
    }

    pub fn visit_fields<V: Visitor>(&mut self, vis: &mut V) -> Result<(), RpcError> {
        let mut code = self.kind().code();
        vis.as_int("type", &mut code)?;
        vis.as_string("func_name", &mut self.func_name)?;
        vis.as_bool("is_uninstall", &mut self.is_uninstall)
    }
}

/// A fully formed RPC message in one adapter's serial representation.
///
/// Construction is one-way per message kind; reading goes through the
/// kind-dispatching accessors, which return [`RpcError::KindMismatch`] when
/// the requested accessor does not apply to the actual kind.
#[derive(Debug, Clone)]
pub struct RpcObject<S: SerialAdapter> {
    obj: S::SerialValue,
}

impl<S: SerialAdapter> RpcObject<S> {
    pub fn of_request<A: TupleShape>(req: Request<A>) -> Result<Self, RpcError> {
        Ok(Self { obj: S::serialize_request(req)? })
    }

    pub fn of_reply<R: Visit + Default>(rep: Reply<R>) -> Result<Self, RpcError> {
        Ok(Self { obj: S::serialize_reply(rep)? })
    }

    pub fn of_reply_with_bind<R: Visit + Default, A: TupleShape>(
        rep: ReplyWithBind<R, A>,
    ) -> Result<Self, RpcError> {
        Ok(Self { obj: S::serialize_reply_with_bind(rep)? })
    }

    pub fn of_error(err: ErrorReply) -> Result<Self, RpcError> {
        Ok(Self { obj: S::serialize_error(err)? })
    }

    pub fn of_install(req: InstallRequest) -> Result<Self, RpcError> {
        Ok(Self { obj: S::serialize_install(req)? })
    }

    /// Decodes transport bytes. Absent on malformed input, e.g. a missing
    /// function name or an unrecognized kind code.
    pub fn parse_bytes(bytes: &[u8]) -> Option<Self> {
        let obj = S::from_bytes(bytes)?;
        S::get_kind(&obj).ok()?;
        Some(Self { obj })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, RpcError> {
        S::to_bytes(&self.obj)
    }

    pub fn kind(&self) -> Result<RpcKind, RpcError> {
        S::get_kind(&self.obj)
    }

    pub fn func_name(&self) -> Result<String, RpcError> {
        S::get_func_name(&self.obj)
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self.kind(),
            Ok(RpcKind::FuncError) | Ok(RpcKind::CallbackError)
        )
    }

    /// Extracts the typed result of a result-kind message.
    ///
    /// For error kinds this re-raises the relayed failure as the matching
    /// [`RpcError`] variant, so callers that only ever look at the result see
    /// remote failures as ordinary errors.
    pub fn get_result<R: Visit + Default>(&self) -> Result<R, RpcError> {
        match self.kind()? {
            RpcKind::FuncResult | RpcKind::CallbackResult => {
                Ok(S::get_reply::<R>(&self.obj)?.result)
            }
            RpcKind::FuncResultWithBind | RpcKind::CallbackResultWithBind => {
                S::get_bound_result::<R>(&self.obj)
            }
            RpcKind::FuncError | RpcKind::CallbackError => {
                let err = S::get_error(&self.obj)?;
                Err(RpcError::with_kind(err.except_kind, err.err_mesg))
            }
            RpcKind::CallbackInstallRequest | RpcKind::CallbackRequest | RpcKind::FuncRequest => {
                Err(RpcError::KindMismatch(
                    "invalid rpc object kind detected".into(),
                ))
            }
        }
    }

    /// Extracts the typed argument tuple of a request or a result-with-bind.
    pub fn get_args<A: TupleShape>(&self) -> Result<A, RpcError> {
        match self.kind()? {
            RpcKind::FuncRequest
            | RpcKind::CallbackRequest
            | RpcKind::FuncResultWithBind
            | RpcKind::CallbackResultWithBind => Ok(S::get_request::<A>(&self.obj)?.args),
            _ => Err(RpcError::KindMismatch(
                "invalid rpc object kind detected".into(),
            )),
        }
    }

    pub fn get_error_kind(&self) -> Result<ExceptionKind, RpcError> {
        match self.kind()? {
            RpcKind::FuncError | RpcKind::CallbackError => {
                Ok(S::get_error(&self.obj)?.except_kind)
            }
            _ => Err(RpcError::KindMismatch(
                "invalid rpc object kind detected".into(),
            )),
        }
    }

    pub fn get_error_mesg(&self) -> Result<String, RpcError> {
        match self.kind()? {
            RpcKind::FuncError | RpcKind::CallbackError => Ok(S::get_error(&self.obj)?.err_mesg),
            _ => Err(RpcError::KindMismatch(
                "invalid rpc object kind detected".into(),
            )),
        }
    }

    pub fn has_bound_args(&self) -> Result<bool, RpcError> {
        match self.kind()? {
            RpcKind::FuncRequest | RpcKind::CallbackRequest => S::has_bound_args(&self.obj),
            RpcKind::FuncResultWithBind | RpcKind::CallbackResultWithBind => Ok(true),
            _ => Err(RpcError::KindMismatch(
                "invalid rpc object kind detected".into(),
            )),
        }
    }

    pub fn is_callback_uninstall(&self) -> Result<bool, RpcError> {
        match self.kind()? {
            RpcKind::CallbackInstallRequest => Ok(S::get_install(&self.obj)?.is_uninstall),
            _ => Err(RpcError::KindMismatch(
                "invalid rpc object kind detected".into(),
            )),
        }
    }
}
