use thiserror::Error;

/// Wire-level failure codes shared by both sides of a connection.
///
/// The numeric codes travel inside error envelopes (`except_type`), so the
/// discriminants are part of the wire format and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExceptionKind {
    #[default]
    None = 0,
    FunctionNotFound = 1,
    RemoteExec = 2,
    Serialization = 3,
    Deserialization = 4,
    SignatureMismatch = 5,
    ClientSend = 6,
    ClientReceive = 7,
    ServerSend = 8,
    ServerReceive = 9,
    KindMismatch = 10,
    CallbackInstall = 11,
    CallbackMissing = 12,
}

impl ExceptionKind {
    /// Decodes a wire code. Unknown codes degrade to [`ExceptionKind::None`]
    /// instead of failing, so a peer speaking a newer taxonomy cannot make
    /// error handling itself error out.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::FunctionNotFound,
            2 => Self::RemoteExec,
            3 => Self::Serialization,
            4 => Self::Deserialization,
            5 => Self::SignatureMismatch,
            6 => Self::ClientSend,
            7 => Self::ClientReceive,
            8 => Self::ServerSend,
            9 => Self::ServerReceive,
            10 => Self::KindMismatch,
            11 => Self::CallbackInstall,
            12 => Self::CallbackMissing,
            _ => Self::None,
        }
    }

    pub fn code(self) -> i64 {
        self as i64
    }
}

/// Every failure the RPC core can produce, locally or relayed from the peer.
///
/// Each variant corresponds to exactly one [`ExceptionKind`]; error envelopes
/// decode back into the matching variant so call sites observe the same error
/// regardless of which side of the wire it originated on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    #[error("RPC error: {0}")]
    General(String),
    #[error("RPC function not found: {0}")]
    FunctionNotFound(String),
    #[error("remote execution failed: {0}")]
    RemoteExec(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("deserialization failed: {0}")]
    Deserialization(String),
    #[error("function signature mismatch: {0}")]
    SignatureMismatch(String),
    #[error("client send failed: {0}")]
    ClientSend(String),
    #[error("client receive failed: {0}")]
    ClientReceive(String),
    #[error("server send failed: {0}")]
    ServerSend(String),
    #[error("server receive failed: {0}")]
    ServerReceive(String),
    #[error("invalid rpc object kind: {0}")]
    KindMismatch(String),
    #[error("callback install failed: {0}")]
    CallbackInstall(String),
    #[error("callback missing: {0}")]
    CallbackMissing(String),
}

impl RpcError {
    /// Reconstructs the error matching a decoded error envelope.
    pub fn with_kind(kind: ExceptionKind, mesg: String) -> Self {
        match kind {
            ExceptionKind::None => Self::General(mesg),
            ExceptionKind::FunctionNotFound => Self::FunctionNotFound(mesg),
            ExceptionKind::RemoteExec => Self::RemoteExec(mesg),
            ExceptionKind::Serialization => Self::Serialization(mesg),
            ExceptionKind::Deserialization => Self::Deserialization(mesg),
            ExceptionKind::SignatureMismatch => Self::SignatureMismatch(mesg),
            ExceptionKind::ClientSend => Self::ClientSend(mesg),
            ExceptionKind::ClientReceive => Self::ClientReceive(mesg),
            ExceptionKind::ServerSend => Self::ServerSend(mesg),
            ExceptionKind::ServerReceive => Self::ServerReceive(mesg),
            ExceptionKind::KindMismatch => Self::KindMismatch(mesg),
            ExceptionKind::CallbackInstall => Self::CallbackInstall(mesg),
            ExceptionKind::CallbackMissing => Self::CallbackMissing(mesg),
        }
    }

    pub fn kind(&self) -> ExceptionKind {
        match self {
            Self::General(_) => ExceptionKind::None,
            Self::FunctionNotFound(_) => ExceptionKind::FunctionNotFound,
            Self::RemoteExec(_) => ExceptionKind::RemoteExec,
            Self::Serialization(_) => ExceptionKind::Serialization,
            Self::Deserialization(_) => ExceptionKind::Deserialization,
            Self::SignatureMismatch(_) => ExceptionKind::SignatureMismatch,
            Self::ClientSend(_) => ExceptionKind::ClientSend,
            Self::ClientReceive(_) => ExceptionKind::ClientReceive,
            Self::ServerSend(_) => ExceptionKind::ServerSend,
            Self::ServerReceive(_) => ExceptionKind::ServerReceive,
            Self::KindMismatch(_) => ExceptionKind::KindMismatch,
            Self::CallbackInstall(_) => ExceptionKind::CallbackInstall,
            Self::CallbackMissing(_) => ExceptionKind::CallbackMissing,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::General(m)
            | Self::FunctionNotFound(m)
            | Self::RemoteExec(m)
            | Self::Serialization(m)
            | Self::Deserialization(m)
            | Self::SignatureMismatch(m)
            | Self::ClientSend(m)
            | Self::ClientReceive(m)
            | Self::ServerSend(m)
            | Self::ServerReceive(m)
            | Self::KindMismatch(m)
            | Self::CallbackInstall(m)
            | Self::CallbackMissing(m) => m,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for code in 0..13 {
            assert_eq!(ExceptionKind::from_code(code).code(), code);
        }
    }

    #[test]
    fn unknown_code_degrades_to_none() {
        assert_eq!(ExceptionKind::from_code(-1), ExceptionKind::None);
        assert_eq!(ExceptionKind::from_code(9000), ExceptionKind::None);
    }

    #[test]
    fn kind_matches_variant() {
        let err = RpcError::with_kind(ExceptionKind::CallbackMissing, "gone".into());
        assert_eq!(err.kind(), ExceptionKind::CallbackMissing);
        assert_eq!(err.message(), "gone");
    }
}
