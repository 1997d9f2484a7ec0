//! # Tools
//!
//! What the pen does. A closed set of tools, each answering `begin`, `motion` and `end` with the
//! commands to send and any local effects. Tools never mutate anything themselves.

use crate::{
    blend::PatchMode,
    color::Rgba8,
    commands::Command,
    fill::{self, FillParams, Sample},
    id::LayerID,
    render,
    state::{LayerSource, StackError},
    stroke::{Brush, Point},
    util::FiniteF32,
};

#[derive(strum::AsRefStr, Copy, Clone, PartialEq, Eq, Hash, Debug, Default)]
pub enum Tool {
    #[default]
    Brush,
    Eraser,
    FloodFill,
    ColorPicker,
}

/// User-adjustable tool state.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct ToolSettings {
    pub foreground: Rgba8,
    pub background: Rgba8,
    pub brush_radius: FiniteF32,
    pub eraser_radius: FiniteF32,
    pub fill_tolerance: u8,
    /// Fill against all visible layers rather than just the target layer.
    pub sample_merged: bool,
}
impl Default for ToolSettings {
    fn default() -> Self {
        let radius = Brush::default().radius;
        Self {
            foreground: Rgba8::BLACK,
            background: Rgba8::WHITE,
            brush_radius: radius,
            eraser_radius: radius,
            fill_tolerance: 0,
            sample_merged: false,
        }
    }
}

/// Something a tool wants done.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolAction {
    /// Preview locally and send to the authority.
    Send(Command),
    /// Set the foreground, or the background if `background`.
    PickColor { color: Rgba8, background: bool },
}

pub type Actions = smallvec::SmallVec<[ToolAction; 2]>;

/// Everything a tool may look at.
pub struct ToolContext<'a, Source: LayerSource> {
    pub source: &'a Source,
    /// The layer edits go to.
    pub layer: LayerID,
    pub settings: &'a ToolSettings,
    /// The alternate mode, held for the whole pointer session.
    pub alt: bool,
}
impl<Source: LayerSource> ToolContext<'_, Source> {
    fn color(&self) -> Rgba8 {
        if self.alt {
            self.settings.background
        } else {
            self.settings.foreground
        }
    }
}

impl Tool {
    /// Tools that work on the shared document, and so need a joined session.
    #[must_use]
    pub fn needs_session(self) -> bool {
        !matches!(self, Self::ColorPicker)
    }
    fn brush<Source: LayerSource>(self, ctx: &ToolContext<Source>) -> Option<Brush> {
        match self {
            Self::Brush => Some(Brush {
                color: ctx.color(),
                radius: ctx.settings.brush_radius,
                mode: PatchMode::Blend,
            }),
            Self::Eraser => Some(Brush::eraser(ctx.settings.eraser_radius)),
            Self::FloodFill | Self::ColorPicker => None,
        }
    }
    fn pick<Source: LayerSource>(ctx: &ToolContext<Source>, point: &Point) -> Actions {
        let (x, y) = point.pixel();
        render::sample_merged(ctx.source, x, y)
            .map(|color| ToolAction::PickColor {
                color,
                background: ctx.alt,
            })
            .into_iter()
            .collect()
    }
    /// The pen went down.
    pub fn begin<Source: LayerSource>(
        self,
        ctx: &ToolContext<Source>,
        point: &Point,
    ) -> Result<Actions, StackError> {
        match self {
            Self::Brush | Self::Eraser => Ok(std::iter::once(ToolAction::Send(Command::UndoPoint))
                .chain(self.motion(ctx, point))
                .collect()),
            Self::FloodFill => {
                let params = FillParams {
                    seed: point.pixel(),
                    color: ctx.color(),
                    tolerance: ctx.settings.fill_tolerance,
                    sample: if ctx.settings.sample_merged {
                        Sample::Merged
                    } else {
                        Sample::Layer(ctx.layer)
                    },
                    target: ctx.layer,
                };
                let result = fill::flood_fill(ctx.source, &params)?;
                Ok(match result.into_command() {
                    Some(command) => smallvec::smallvec![
                        ToolAction::Send(Command::UndoPoint),
                        ToolAction::Send(command),
                    ],
                    None => Actions::new(),
                })
            }
            Self::ColorPicker => Ok(Self::pick(ctx, point)),
        }
    }
    /// The pen moved while down.
    #[must_use]
    pub fn motion<Source: LayerSource>(self, ctx: &ToolContext<Source>, point: &Point) -> Actions {
        match self {
            Self::Brush | Self::Eraser => self
                .brush(ctx)
                .map(|brush| {
                    ToolAction::Send(Command::StrokePoint {
                        layer: ctx.layer,
                        brush,
                        point: *point,
                    })
                })
                .into_iter()
                .collect(),
            Self::ColorPicker => Self::pick(ctx, point),
            Self::FloodFill => Actions::new(),
        }
    }
    /// The pen came up.
    #[must_use]
    pub fn end(self) -> Actions {
        match self {
            Self::Brush | Self::Eraser => smallvec::smallvec![ToolAction::Send(Command::StrokeEnd)],
            Self::FloodFill | Self::ColorPicker => Actions::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        raster::{Patch, Raster},
        state::LayerStack,
    };

    fn point(x: f32, y: f32) -> Point {
        Point::new(x, y, 1.0).unwrap()
    }

    #[test]
    fn brush_sequence() {
        let stack = LayerStack::new(8, 8);
        let settings = ToolSettings::default();
        let ctx = ToolContext {
            source: &stack,
            layer: LayerID(1),
            settings: &settings,
            alt: true,
        };
        let begin = Tool::Brush.begin(&ctx, &point(1.0, 1.0)).unwrap();
        assert_eq!(begin[0], ToolAction::Send(Command::UndoPoint));
        let ToolAction::Send(Command::StrokePoint { brush, .. }) = &begin[1] else {
            panic!("expected a stroke point");
        };
        assert_eq!(brush.color, settings.background);
        assert_eq!(Tool::Brush.motion(&ctx, &point(2.0, 2.0)).len(), 1);
        assert_eq!(
            Tool::Brush.end().as_slice(),
            &[ToolAction::Send(Command::StrokeEnd)]
        );
    }
    #[test]
    fn eraser_replaces() {
        let stack = LayerStack::new(8, 8);
        let settings = ToolSettings::default();
        let ctx = ToolContext {
            source: &stack,
            layer: LayerID(1),
            settings: &settings,
            alt: false,
        };
        let actions = Tool::Eraser.motion(&ctx, &point(1.0, 1.0));
        let [ToolAction::Send(Command::StrokePoint { brush, .. })] = actions.as_slice() else {
            panic!("expected a stroke point");
        };
        assert_eq!(brush.mode, PatchMode::Replace);
        assert_eq!(brush.color, Rgba8::TRANSPARENT);
    }
    #[test]
    fn fill_emits_patch() {
        let stack = LayerStack::new(8, 8);
        let settings = ToolSettings::default();
        let ctx = ToolContext {
            source: &stack,
            layer: LayerID(1),
            settings: &settings,
            alt: false,
        };
        let actions = Tool::FloodFill.begin(&ctx, &point(3.0, 3.0)).unwrap();
        assert_eq!(actions.len(), 2);
        assert!(matches!(
            &actions[1],
            ToolAction::Send(Command::PutImage { layer: LayerID(1), patch }) if patch.rect.area() == 64
        ));
        assert!(Tool::FloodFill.motion(&ctx, &point(4.0, 4.0)).is_empty());

        let off = Tool::FloodFill.begin(&ctx, &point(-3.0, 3.0)).unwrap();
        assert!(off.is_empty(), "nothing to fill, not even an undo point");
    }
    #[test]
    fn fill_missing_layer() {
        let stack = LayerStack::new(8, 8);
        let settings = ToolSettings::default();
        let ctx = ToolContext {
            source: &stack,
            layer: LayerID(4),
            settings: &settings,
            alt: false,
        };
        assert_eq!(
            Tool::FloodFill.begin(&ctx, &point(3.0, 3.0)),
            Err(StackError::NotFound(LayerID(4)))
        );
    }
    #[test]
    fn picker() {
        let mut stack = LayerStack::new(4, 4);
        let bg = stack.top().unwrap();
        let color = Rgba8::opaque(10, 20, 30);
        stack
            .apply_patch(
                bg,
                &Patch::image(0, 0, Raster::filled(4, 4, color), PatchMode::Replace),
            )
            .unwrap();
        let settings = ToolSettings::default();
        let ctx = ToolContext {
            source: &stack,
            layer: bg,
            settings: &settings,
            alt: true,
        };
        assert_eq!(
            Tool::ColorPicker.begin(&ctx, &point(1.5, 2.5)).unwrap().as_slice(),
            &[ToolAction::PickColor {
                color,
                background: true
            }]
        );
        assert!(Tool::ColorPicker.motion(&ctx, &point(9.0, 9.0)).is_empty());
        assert!(!Tool::ColorPicker.needs_session());
    }
}
