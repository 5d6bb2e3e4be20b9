//! The serialization contract every pluggable wire format implements.

use crate::envelope::{ErrorReply, InstallRequest, Reply, ReplyWithBind, Request, RpcKind};
use crate::error::RpcError;
use crate::visit::{TupleShape, Visit, Visitor};

/// One wire format: a serial value type plus a visitor pair over it.
///
/// The envelope-level entry points (`serialize_request`, `get_reply`, ...)
/// have default implementations driving the message's `visit_fields` through
/// the visitor pair; a format only overrides them when its layout requires it
/// (the compact binary format overrides [`SerialAdapter::get_bound_result`]
/// because it must skip the rebound argument block positionally).
pub trait SerialAdapter: Sized {
    /// Adapter-specific in-memory representation of one message.
    type SerialValue: Clone;
    /// Writing visitor producing a [`Self::SerialValue`].
    type Serializer: Visitor;
    /// Reading visitor over a [`Self::SerialValue`].
    type Deserializer: Visitor;

    fn serializer() -> Self::Serializer;
    fn finish(ser: Self::Serializer) -> Result<Self::SerialValue, RpcError>;
    fn deserializer(obj: &Self::SerialValue) -> Self::Deserializer;

    /// Decodes raw transport bytes; `None` on malformed input (missing
    /// function name, invalid kind code, truncated buffer).
    fn from_bytes(bytes: &[u8]) -> Option<Self::SerialValue>;
    fn to_bytes(obj: &Self::SerialValue) -> Result<Vec<u8>, RpcError>;

    /// Cheap partial decode of the function name.
    fn get_func_name(obj: &Self::SerialValue) -> Result<String, RpcError>;
    /// Cheap partial decode of the kind tag; rejects unrecognized codes.
    fn get_kind(obj: &Self::SerialValue) -> Result<RpcKind, RpcError>;
    /// Reads the `bind_args` flag of a request.
    fn has_bound_args(obj: &Self::SerialValue) -> Result<bool, RpcError>;

    fn serialize_request<A: TupleShape>(
        mut req: Request<A>,
    ) -> Result<Self::SerialValue, RpcError> {
        let mut vis = Self::serializer();
        req.visit_fields(&mut vis)?;
        Self::finish(vis)
    }

    fn get_request<A: TupleShape>(obj: &Self::SerialValue) -> Result<Request<A>, RpcError> {
        let mut vis = Self::deserializer(obj);
        let mut req = Request::<A>::default();
        req.visit_fields(&mut vis)?;
        Ok(req)
    }

    fn serialize_reply<R: Visit + Default>(
        mut rep: Reply<R>,
    ) -> Result<Self::SerialValue, RpcError> {
        let mut vis = Self::serializer();
        rep.visit_fields(&mut vis)?;
        Self::finish(vis)
    }

    fn get_reply<R: Visit + Default>(obj: &Self::SerialValue) -> Result<Reply<R>, RpcError> {
        let mut vis = Self::deserializer(obj);
        let mut rep = Reply::<R>::default();
        rep.visit_fields(&mut vis)?;
        Ok(rep)
    }

    fn serialize_reply_with_bind<R: Visit + Default, A: TupleShape>(
        mut rep: ReplyWithBind<R, A>,
    ) -> Result<Self::SerialValue, RpcError> {
        let mut vis = Self::serializer();
        rep.visit_fields(&mut vis)?;
        Self::finish(vis)
    }

    /// Extracts just the result of a `*ResultWithBind` message.
    fn get_bound_result<R: Visit + Default>(obj: &Self::SerialValue) -> Result<R, RpcError> {
        Ok(Self::get_reply::<R>(obj)?.result)
    }

    fn serialize_error(mut err: ErrorReply) -> Result<Self::SerialValue, RpcError> {
        let mut vis = Self::serializer();
        err.visit_fields(&mut vis)?;
        Self::finish(vis)
    }

    fn get_error(obj: &Self::SerialValue) -> Result<ErrorReply, RpcError> {
        let mut vis = Self::deserializer(obj);
        let mut err = ErrorReply::default();
        err.visit_fields(&mut vis)?;
        Ok(err)
    }

    fn serialize_install(mut req: InstallRequest) -> Result<Self::SerialValue, RpcError> {
        let mut vis = Self::serializer();
        req.visit_fields(&mut vis)?;
        Self::finish(vis)
    }

    fn get_install(obj: &Self::SerialValue) -> Result<InstallRequest, RpcError> {
        let mut vis = Self::deserializer(obj);
        let mut req = InstallRequest::default();
        req.visit_fields(&mut vis)?;
        Ok(req)
    }
}
