use serde::{Deserialize, Serialize};

use crate::ports::PortError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionPhase {
    Disconnected,
    WrongNetwork,
    Switching,
    DerivingSigner,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionAction {
    Connect,
    Disconnect,
    ChainMismatch,
    ChainMatched,
    SwitchStart,
    SwitchSucceeded,
    SwitchFailed,
    SignerDerived,
    SignerFailed,
    Reconnect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseTransition {
    pub from: ConnectionPhase,
    pub to: ConnectionPhase,
    pub action: ConnectionAction,
    pub reason: &'static str,
    pub generation: u64,
}

pub fn connection_transition(
    from: ConnectionPhase,
    action: ConnectionAction,
) -> Result<(ConnectionPhase, &'static str), PortError> {
    use ConnectionAction as A;
    use ConnectionPhase as P;

    let next = match (from, action) {
        (_, A::Disconnect) => (P::Disconnected, "wallet disconnected"),

        (P::Disconnected, A::Connect) => (P::DerivingSigner, "wallet connected"),
        (P::Disconnected, A::ChainMismatch) => (P::WrongNetwork, "connected on wrong network"),

        (
            P::WrongNetwork | P::Ready | P::Error | P::DerivingSigner,
            A::ChainMismatch,
        ) => (P::WrongNetwork, "chain changed away from required network"),
        (
            P::WrongNetwork | P::Ready | P::Error | P::DerivingSigner,
            A::ChainMatched | A::Connect,
        ) => (P::DerivingSigner, "required network observed"),

        (P::WrongNetwork | P::Ready | P::Error | P::DerivingSigner, A::SwitchStart) => {
            (P::Switching, "network switch requested")
        }
        (P::Switching, A::SwitchSucceeded) => (P::DerivingSigner, "network switch succeeded"),
        (P::Switching, A::SwitchFailed) => (P::WrongNetwork, "network switch failed"),
        (P::Switching, A::ChainMismatch) => (P::Switching, "chain observed during switch"),
        (P::Switching, A::ChainMatched | A::Connect) => {
            (P::Switching, "required network observed during switch")
        }

        (P::DerivingSigner | P::Ready | P::Error, A::SignerDerived) => {
            (P::Ready, "signer derived")
        }
        (P::DerivingSigner | P::Ready | P::Error, A::SignerFailed) => {
            (P::Error, "signer derivation failed")
        }
        (P::Ready | P::Error | P::DerivingSigner, A::Reconnect) => {
            (P::DerivingSigner, "manual reconnect")
        }

        _ => {
            return Err(PortError::Validation(format!(
                "illegal connection transition: {from:?} --{action:?}-->"
            )))
        }
    };
    Ok(next)
}
