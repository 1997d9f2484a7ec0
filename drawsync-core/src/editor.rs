//! # Board editor
//!
//! The only way into the [`LayerStack`]. Local edits land in the [`PreviewLayer`] and never touch the
//! stack; authoritative commands are applied to the stack in sequence order, and retire the local
//! preview they echo.

use std::collections::VecDeque;

use crate::{
    commands::{Command, ProtocolError, SequencedCommand},
    id::{PreviewToken, SeqNum, TokenAllocator, UserID},
    preview::{DirtyList, PreviewEdit, PreviewLayer},
    state::{LayerStack, StackError},
    stroke::{self, Point},
};

/// How many undo points are remembered per user.
pub const UNDO_HISTORY: usize = 32;

/// What became of an authoritative command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// Could not be applied and was skipped entirely. The session carries on.
    Skipped(StackError),
}

/// Strokes are keyed by their issuer and the issuer's token. Both travel on every sequenced command,
/// so every participant tracks the same strokes, even several concurrent ones from one user.
type StrokeKey = (UserID, Option<PreviewToken>);

pub struct BoardEditor {
    stack: LayerStack,
    preview: PreviewLayer,
    tokens: TokenAllocator,
    local_user: Option<UserID>,
    last_seq: Option<SeqNum>,
    /// Last point of each in-progress authoritative stroke.
    strokes: hashbrown::HashMap<StrokeKey, Point>,
    /// Last point of each in-progress local stroke.
    local_strokes: hashbrown::HashMap<PreviewToken, Point>,
    undo_points: hashbrown::HashMap<UserID, VecDeque<SeqNum>>,
}
impl BoardEditor {
    #[must_use]
    pub fn new(stack: LayerStack) -> Self {
        Self {
            stack,
            preview: PreviewLayer::new(),
            tokens: TokenAllocator::new(),
            local_user: None,
            last_seq: None,
            strokes: hashbrown::HashMap::new(),
            local_strokes: hashbrown::HashMap::new(),
            undo_points: hashbrown::HashMap::new(),
        }
    }
    #[must_use]
    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }
    /// Subscribe to stack and preview repaint notifications.
    pub fn listen(&mut self) -> bus::BusReader<crate::state::StackEvent> {
        self.stack.listen()
    }
    #[must_use]
    pub fn preview(&self) -> &PreviewLayer {
        &self.preview
    }
    #[must_use]
    pub fn local_user(&self) -> Option<UserID> {
        self.local_user
    }
    pub fn set_local_user(&mut self, user: Option<UserID>) {
        self.local_user = user;
    }
    #[must_use]
    pub fn last_seq(&self) -> Option<SeqNum> {
        self.last_seq
    }
    /// The most recent undo point issued by `origin`.
    #[must_use]
    pub fn last_undo_point(&self, origin: UserID) -> Option<SeqNum> {
        self.undo_points.get(&origin).and_then(|seqs| seqs.back().copied())
    }
    /// A fresh handle for a new local pointer session.
    pub fn new_token(&mut self) -> PreviewToken {
        self.tokens.allocate()
    }

    /// Check whether a local command could apply right now. Changes nothing.
    ///
    /// A malformed local command is the caller's mistake, not the authority's, so it is reported
    /// as an invalid operation rather than a protocol error.
    pub fn validate_local(&self, command: &Command) -> Result<(), StackError> {
        if let Some(reason) = command.malformed_reason() {
            return Err(StackError::InvalidOperation(reason));
        }
        self.stack.validate(command)
    }
    /// Preview a local command under `token`. The stack is left untouched.
    ///
    /// Fails synchronously, leaving no trace, if the command could not currently apply.
    pub fn apply_local(
        &mut self,
        token: PreviewToken,
        command: &Command,
    ) -> Result<PreviewToken, StackError> {
        self.validate_local(command)?;

        let edit = match command {
            Command::StrokePoint {
                layer,
                brush,
                point,
            } => {
                let previous = self.local_strokes.insert(token, *point);
                stroke::rasterize(brush, previous.as_ref(), point, self.stack.bounds())
                    .map_or(PreviewEdit::Placeholder, |patch| PreviewEdit::Pixels {
                        layer: *layer,
                        patch,
                    })
            }
            Command::StrokeEnd => {
                self.local_strokes.remove(&token);
                PreviewEdit::Placeholder
            }
            Command::PutImage { layer, patch } => PreviewEdit::Pixels {
                layer: *layer,
                patch: patch.clone(),
            },
            // Structure and metadata aren't previewed, they show up once sequenced.
            Command::LayerCreate { .. }
            | Command::LayerDelete { .. }
            | Command::LayerMove { .. }
            | Command::LayerOpacity { .. }
            | Command::LayerRename { .. }
            | Command::UndoPoint => PreviewEdit::Placeholder,
        };
        if let Some((layer, rect)) = self.preview.push(token, edit) {
            self.stack.mark_dirty(layer, rect);
        }
        Ok(token)
    }
    /// The local pointer session for `token` ended. Pending edits stay until echoed.
    pub fn close_local(&mut self, token: PreviewToken) {
        self.local_strokes.remove(&token);
        self.preview.close(token);
    }
    /// Drop a local preview early. Unknown tokens are ignored.
    pub fn retire(&mut self, token: PreviewToken) {
        self.local_strokes.remove(&token);
        for (layer, rect) in self.preview.retire(token) {
            self.stack.mark_dirty(layer, rect);
        }
    }

    /// Apply a command from the authoritative stream.
    ///
    /// Protocol errors are fatal and leave everything untouched. Commands that merely can't apply
    /// (unknown layer, deleting the last layer, ...) are skipped with a warning.
    pub fn apply_authoritative(
        &mut self,
        sequenced: &SequencedCommand,
    ) -> Result<Outcome, ProtocolError> {
        if let Some(last) = self.last_seq {
            if sequenced.seq <= last {
                return Err(ProtocolError::SequenceRegression {
                    last,
                    got: sequenced.seq,
                });
            }
        }
        sequenced.command.check_well_formed()?;
        self.last_seq = Some(sequenced.seq);
        log::trace!(
            "{} from {}: {}",
            sequenced.seq,
            sequenced.origin,
            sequenced.command.as_ref()
        );

        let outcome = match self.apply_to_stack(sequenced) {
            Ok(()) => Outcome::Applied,
            Err(err) => {
                log::warn!(
                    "Skipping {} {} from {}: {err}",
                    sequenced.seq,
                    sequenced.command.as_ref(),
                    sequenced.origin
                );
                Outcome::Skipped(err)
            }
        };

        // Reconcile even when skipped, the echo still consumes the local edit.
        if let (Some(token), Some(local)) = (sequenced.token, self.local_user) {
            if sequenced.origin == local {
                if let Some((layer, rect)) = self.preview.acknowledge(token) {
                    self.stack.mark_dirty(layer, rect);
                }
            }
        }
        Ok(outcome)
    }
    fn apply_to_stack(&mut self, sequenced: &SequencedCommand) -> Result<(), StackError> {
        let key = (sequenced.origin, sequenced.token);
        match &sequenced.command {
            Command::StrokePoint {
                layer,
                brush,
                point,
            } => {
                self.stack.validate(&sequenced.command)?;
                let previous = self.strokes.insert(key, *point);
                if let Some(patch) =
                    stroke::rasterize(brush, previous.as_ref(), point, self.stack.bounds())
                {
                    self.stack.apply_patch(*layer, &patch)?;
                }
            }
            Command::StrokeEnd => {
                self.strokes.remove(&key);
            }
            Command::PutImage { layer, patch } => {
                self.stack.apply_patch(*layer, patch)?;
            }
            Command::LayerCreate { name } => {
                self.stack.create_layer(name.clone());
            }
            Command::LayerDelete { layer, merge_down } => {
                self.stack.delete_layer(*layer, *merge_down)?;
            }
            Command::LayerMove { layer, index } => {
                self.stack.move_layer(*layer, *index)?;
            }
            Command::LayerOpacity { layer, opacity } => {
                self.stack.set_opacity(*layer, *opacity)?;
            }
            Command::LayerRename { layer, name } => {
                self.stack.set_name(*layer, name.clone())?;
            }
            Command::UndoPoint => {
                let history = self.undo_points.entry(sequenced.origin).or_default();
                if history.len() == UNDO_HISTORY {
                    history.pop_front();
                }
                history.push_back(sequenced.seq);
            }
        }
        Ok(())
    }
    /// Toggle a layer's visibility. Local view state, never shared.
    pub fn set_visible(&mut self, layer: crate::id::LayerID, visible: bool) -> Result<(), StackError> {
        self.stack.set_visible(layer, visible)
    }

    /// Discard all speculative and sequencing state, keeping the document as last seen.
    pub fn disconnect(&mut self) -> DirtyList {
        let dirty = self.preview.clear();
        for &(layer, rect) in &dirty {
            self.stack.mark_dirty(layer, rect);
        }
        self.local_strokes.clear();
        self.strokes.clear();
        self.last_seq = None;
        dirty
    }
    /// Start over with a blank document, as when joining a session.
    pub fn reset_document(&mut self, width: u32, height: u32) {
        self.disconnect();
        self.undo_points.clear();
        self.stack.reset(width, height);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        blend::{Opacity, PatchMode},
        color::Rgba8,
        commands::Envelope,
        id::LayerID,
        raster::{Mask, Patch},
        state::{LayerSource, StackEvent},
        stroke::Brush,
    };

    const ME: UserID = UserID(1);
    const THEM: UserID = UserID(2);

    fn editor() -> BoardEditor {
        let mut editor = BoardEditor::new(LayerStack::new(16, 16));
        editor.set_local_user(Some(ME));
        editor
    }
    fn sequenced(seq: u64, origin: UserID, token: Option<PreviewToken>, command: Command) -> SequencedCommand {
        SequencedCommand::from_envelope(SeqNum(seq), origin, Envelope { token, command })
    }
    fn stroke_point(x: f32, y: f32) -> Command {
        Command::StrokePoint {
            layer: LayerID(1),
            brush: Brush::default(),
            point: Point::new(x, y, 1.0).unwrap(),
        }
    }
    fn pixels(editor: &BoardEditor) -> Vec<Rgba8> {
        editor
            .stack()
            .layers()
            .iter()
            .flat_map(|layer| layer.raster().pixels().iter().copied())
            .collect()
    }

    #[test]
    fn local_never_touches_stack() {
        let mut editor = editor();
        let token = editor.new_token();
        editor.apply_local(token, &stroke_point(4.0, 4.0)).unwrap();
        assert!(pixels(&editor).iter().all(|px| *px == Rgba8::TRANSPARENT));
        assert_eq!(editor.preview().pending(token), 1);
    }
    #[test]
    fn local_rejects_missing_layer() {
        let mut editor = editor();
        let token = editor.new_token();
        let command = Command::LayerOpacity {
            layer: LayerID(9),
            opacity: Opacity::OPAQUE,
        };
        assert_eq!(
            editor.apply_local(token, &command),
            Err(StackError::NotFound(LayerID(9)))
        );
        assert!(editor.preview().is_empty());
    }
    #[test]
    fn round_trip() {
        let commands = [
            Command::UndoPoint,
            stroke_point(3.0, 3.0),
            stroke_point(9.0, 5.0),
            Command::StrokeEnd,
        ];

        let mut direct = editor();
        for (seq, command) in commands.iter().enumerate() {
            direct
                .apply_authoritative(&sequenced(seq as u64 + 1, ME, None, command.clone()))
                .unwrap();
        }

        let mut local = editor();
        let token = local.new_token();
        for (seq, command) in commands.iter().enumerate() {
            local.apply_local(token, command).unwrap();
            local
                .apply_authoritative(&sequenced(seq as u64 + 1, ME, Some(token), command.clone()))
                .unwrap();
        }
        assert!(local.preview().is_empty());
        assert_eq!(pixels(&local), pixels(&direct));
    }
    #[test]
    fn interleaving_is_irrelevant() {
        let theirs = [
            (1, Command::LayerCreate { name: "Ink".into() }),
            (2, stroke_point(2.0, 2.0)),
            (3, Command::StrokeEnd),
        ];
        let mut quiet = editor();
        for (seq, command) in &theirs {
            quiet
                .apply_authoritative(&sequenced(*seq, THEM, None, command.clone()))
                .unwrap();
        }

        let mut busy = editor();
        let token = busy.new_token();
        for (seq, command) in &theirs {
            busy.apply_local(token, &stroke_point(8.0, 8.0)).unwrap();
            busy.apply_authoritative(&sequenced(*seq, THEM, None, command.clone()))
                .unwrap();
        }
        assert_eq!(busy.preview().pending(token), 3);
        assert_eq!(pixels(&busy), pixels(&quiet));
    }
    #[test]
    fn foreign_tokens_never_match() {
        let mut editor = editor();
        let token = editor.new_token();
        editor.apply_local(token, &stroke_point(1.0, 1.0)).unwrap();
        // Same raw token, different user.
        editor
            .apply_authoritative(&sequenced(1, THEM, Some(token), stroke_point(1.0, 1.0)))
            .unwrap();
        assert_eq!(editor.preview().pending(token), 1);
    }
    #[test]
    fn regression_is_fatal() {
        let mut editor = editor();
        editor
            .apply_authoritative(&sequenced(5, THEM, None, Command::UndoPoint))
            .unwrap();
        for seq in [5, 4] {
            assert!(matches!(
                editor.apply_authoritative(&sequenced(seq, THEM, None, Command::UndoPoint)),
                Err(ProtocolError::SequenceRegression { .. })
            ));
        }
        assert_eq!(editor.last_seq(), Some(SeqNum(5)));
    }
    #[test]
    fn malformed_is_fatal() {
        let mut editor = editor();
        let mut patch = Patch::masked(0, 0, Mask::new(2, 2), Rgba8::BLACK, PatchMode::Blend);
        patch.rect.width = 7;
        let result =
            editor.apply_authoritative(&sequenced(1, THEM, None, Command::PutImage { layer: LayerID(1), patch }));
        assert!(matches!(result, Err(ProtocolError::Malformed { .. })));
        assert_eq!(editor.last_seq(), None);
    }
    #[test]
    fn missing_layer_skipped() {
        let mut editor = editor();
        let token = editor.new_token();
        let command = Command::LayerOpacity {
            layer: LayerID(1),
            opacity: Opacity(10),
        };
        editor.apply_local(token, &command).unwrap();
        // Someone else deleted the layer in the meantime.
        editor
            .apply_authoritative(&sequenced(1, THEM, None, Command::LayerCreate { name: "b".into() }))
            .unwrap();
        editor
            .apply_authoritative(&sequenced(
                2,
                THEM,
                None,
                Command::LayerDelete {
                    layer: LayerID(1),
                    merge_down: false,
                },
            ))
            .unwrap();
        let outcome = editor
            .apply_authoritative(&sequenced(3, ME, Some(token), command))
            .unwrap();
        assert_eq!(outcome, Outcome::Skipped(StackError::NotFound(LayerID(1))));
        assert!(editor.preview().is_empty());
        assert_eq!(editor.last_seq(), Some(SeqNum(3)));
    }
    #[test]
    fn undo_history_bounded() {
        let mut editor = editor();
        for seq in 1..=(UNDO_HISTORY as u64 + 10) {
            editor
                .apply_authoritative(&sequenced(seq, THEM, None, Command::UndoPoint))
                .unwrap();
        }
        assert_eq!(editor.last_undo_point(THEM), Some(SeqNum(UNDO_HISTORY as u64 + 10)));
        assert_eq!(editor.undo_points[&THEM].len(), UNDO_HISTORY);
        assert_eq!(editor.last_undo_point(ME), None);
    }
    #[test]
    fn concurrent_strokes_stay_apart() {
        let mut editor = editor();
        let mut tokens = TokenAllocator::new();
        let (a, b) = (tokens.allocate(), tokens.allocate());
        let brush = Brush {
            radius: crate::util::FiniteF32::new(0.5).unwrap(),
            ..Brush::default()
        };
        let at = |x: f32, y: f32| Command::StrokePoint {
            layer: LayerID(1),
            brush,
            point: Point::new(x, y, 1.0).unwrap(),
        };
        // Two strokes from one user, interleaved point by point.
        let commands = [
            (a, at(0.5, 0.5)),
            (b, at(0.5, 10.5)),
            (a, at(10.5, 0.5)),
            (b, at(10.5, 10.5)),
            (a, Command::StrokeEnd),
            (b, Command::StrokeEnd),
        ];
        for (seq, (token, command)) in commands.into_iter().enumerate() {
            editor
                .apply_authoritative(&sequenced(seq as u64 + 1, THEM, Some(token), command))
                .unwrap();
        }
        let raster = editor.stack().layer(LayerID(1)).unwrap().raster();
        let row = |y: i64| (0..16).filter(|&x| raster.get(x, y) != Some(Rgba8::TRANSPARENT)).count();
        assert_eq!(row(0), 11);
        assert_eq!(row(10), 11);
        // Joining the two strokes would have crossed the rows between.
        assert_eq!(row(5), 0);
    }
    #[test]
    fn retire_is_idempotent() {
        let mut editor = editor();
        let mut rx = editor.listen();
        let token = editor.new_token();
        editor.apply_local(token, &stroke_point(4.0, 4.0)).unwrap();
        while rx.try_recv().is_ok() {}

        editor.retire(token);
        assert!(editor.preview().is_empty());
        assert!(matches!(rx.try_recv(), Ok(StackEvent::Dirty { layer: LayerID(1), .. })));

        // Already retired, and never issued.
        editor.retire(token);
        let unknown = editor.new_token();
        editor.retire(unknown);
        assert!(rx.try_recv().is_err());
    }
    #[test]
    fn disconnect_flushes() {
        let mut editor = editor();
        let mut rx = editor.listen();
        let tokens: Vec<_> = (0..3).map(|_| editor.new_token()).collect();
        for (i, token) in tokens.iter().enumerate() {
            editor
                .apply_local(*token, &stroke_point(2.0 + 4.0 * i as f32, 8.0))
                .unwrap();
        }
        while rx.try_recv().is_ok() {}
        assert_eq!(editor.preview().len(), 3);

        let dirty = editor.disconnect();
        assert!(editor.preview().is_empty());
        assert_eq!(dirty.len(), 3);
        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(editor.last_seq(), None);
    }
}
