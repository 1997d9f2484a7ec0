//! # Commands
//!
//! Commands are the only way the shared document changes. Locally they travel outward wrapped in an
//! [`Envelope`]; the authoritative peer assigns each one a sequence number and broadcasts it back to every
//! participant as a [`SequencedCommand`]. Applying the same sequenced commands in the same order yields the
//! same pixels everywhere.

use crate::{
    blend::Opacity,
    id::{LayerID, PreviewToken, SeqNum, UserID},
    raster::Patch,
    stroke::{Brush, Point},
};

#[derive(Clone, Debug, PartialEq, Eq, strum::AsRefStr)]
pub enum Command {
    /// Stamp the brush at `point`, continuing the issuing user's stroke if one is in progress.
    StrokePoint {
        layer: LayerID,
        brush: Brush,
        point: Point,
    },
    /// End the issuing user's stroke.
    StrokeEnd,
    /// Apply a raster patch. Flood fills travel as these, never as fill parameters.
    PutImage { layer: LayerID, patch: Patch },
    /// Append a new layer on top. The id is the stack's next unused one, which is identical on every
    /// participant as the command is applied in global order.
    LayerCreate { name: String },
    LayerDelete { layer: LayerID, merge_down: bool },
    /// Move to `index` in bottom-to-top order. Out of range indices are clamped.
    LayerMove { layer: LayerID, index: usize },
    LayerOpacity { layer: LayerID, opacity: Opacity },
    LayerRename { layer: LayerID, name: String },
    /// Marks the start of an undoable operation.
    UndoPoint,
}
impl Command {
    /// The layer this command operates on, if any.
    #[must_use]
    pub fn layer(&self) -> Option<LayerID> {
        match self {
            Self::StrokePoint { layer, .. }
            | Self::PutImage { layer, .. }
            | Self::LayerDelete { layer, .. }
            | Self::LayerMove { layer, .. }
            | Self::LayerOpacity { layer, .. }
            | Self::LayerRename { layer, .. } => Some(*layer),
            Self::StrokeEnd | Self::LayerCreate { .. } | Self::UndoPoint => None,
        }
    }
    /// Does this command change pixels, as opposed to structure or metadata?
    #[must_use]
    pub fn is_raster(&self) -> bool {
        matches!(
            self,
            Self::StrokePoint { .. } | Self::StrokeEnd | Self::PutImage { .. }
        )
    }
    /// Why this command is structurally broken, independent of any document state.
    #[must_use]
    pub fn malformed_reason(&self) -> Option<&'static str> {
        match self {
            Self::PutImage { patch, .. } if !patch.is_well_formed() => {
                Some("patch content does not match its rect")
            }
            Self::PutImage { patch, .. } if patch.rect.is_empty() => Some("patch is empty"),
            Self::LayerCreate { name } | Self::LayerRename { name, .. } if name.is_empty() => {
                Some("layer name is empty")
            }
            _ => None,
        }
    }
    /// [`Self::malformed_reason`] as a protocol violation, for commands from the authority.
    pub fn check_well_formed(&self) -> Result<(), ProtocolError> {
        match self.malformed_reason() {
            None => Ok(()),
            Some(reason) => Err(ProtocolError::Malformed {
                kind: self.as_ref().to_owned(),
                reason,
            }),
        }
    }
}

/// A command on its way to the authoritative peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Echoed back unchanged on the sequenced copy, so the issuer can retire its preview.
    pub token: Option<PreviewToken>,
    pub command: Command,
}

/// A command as delivered by the authoritative peer. Immutable once sequenced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequencedCommand {
    pub seq: SeqNum,
    /// The participant that issued the command.
    pub origin: UserID,
    /// The issuer's preview token, meaningful only to the issuer.
    pub token: Option<PreviewToken>,
    pub command: Command,
}
impl SequencedCommand {
    /// Sequence an envelope, as the authoritative peer does.
    #[must_use]
    pub fn from_envelope(seq: SeqNum, origin: UserID, envelope: Envelope) -> Self {
        Self {
            seq,
            origin,
            token: envelope.token,
            command: envelope.command,
        }
    }
}

/// Violations of the authoritative stream contract. Always fatal to the session.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("sequence number regressed: {got} after {last}")]
    SequenceRegression { last: SeqNum, got: SeqNum },
    #[error("malformed {kind} command: {reason}")]
    Malformed { kind: String, reason: &'static str },
    #[error("unexpected {event} while {state}")]
    UnexpectedEvent {
        event: &'static str,
        state: &'static str,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{blend::PatchMode, color::Rgba8, raster::Mask};

    #[test]
    fn malformed_patch() {
        let mut patch = Patch::masked(0, 0, Mask::new(2, 2), Rgba8::BLACK, PatchMode::Blend);
        patch.rect.height = 5;
        let command = Command::PutImage {
            layer: LayerID(1),
            patch,
        };
        assert!(matches!(
            command.check_well_formed(),
            Err(ProtocolError::Malformed { kind, .. }) if kind == "PutImage"
        ));
    }
    #[test]
    fn empty_name() {
        assert!(Command::LayerCreate {
            name: String::new()
        }
        .check_well_formed()
        .is_err());
        assert!(Command::LayerCreate { name: "Ink".into() }
            .check_well_formed()
            .is_ok());
    }
    #[test]
    fn targets() {
        assert_eq!(Command::StrokeEnd.layer(), None);
        assert_eq!(
            Command::LayerMove {
                layer: LayerID(4),
                index: 0
            }
            .layer(),
            Some(LayerID(4))
        );
        assert!(Command::StrokeEnd.is_raster());
        assert!(!Command::UndoPoint.is_raster());
    }
}
