#![warn(clippy::pedantic)]

mod export;
mod loopback;
mod settings;

use drawsync_core::{
    controller::{Controller, Inbound, Notice, Outbound},
    raster::Raster,
    stroke::Point,
    tools::Tool,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

use anyhow::Result as AnyResult;

/// How long the inbound stream must stay quiet before a step of the script is considered settled.
const SETTLE_TIME: std::time::Duration = std::time::Duration::from_millis(50);

/// Apply everything the authority has sent, until it goes quiet.
async fn pump(
    controller: &mut Controller,
    inbound: &mut UnboundedReceiver<Inbound>,
    notices: &mut UnboundedReceiver<Notice>,
) -> AnyResult<()> {
    while let Ok(Some(message)) = tokio::time::timeout(SETTLE_TIME, inbound.recv()).await {
        controller.handle(message)?;
        while let Ok(notice) = notices.try_recv() {
            log::info!("{notice:?}");
        }
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn canvas_size(controller: &Controller) -> (f32, f32) {
    let stack = controller.editor().stack();
    (stack.width() as f32, stack.height() as f32)
}

/// A closed square outline around the middle of the canvas.
fn draw_outline(controller: &mut Controller) -> AnyResult<()> {
    let (w, h) = canvas_size(controller);
    let (left, top, right, bottom) = (w * 0.25, h * 0.25, w * 0.75, h * 0.75);

    controller.set_tool(Tool::Brush)?;
    controller.pen_down(Point::new(left, top, 0.6)?, false)?;
    for (x, y) in [(right, top), (right, bottom), (left, bottom), (left, top)] {
        controller.pen_move(Point::new(x, y, 1.0)?)?;
    }
    controller.pen_up()?;
    Ok(())
}

/// Fill whatever region contains the middle of the canvas.
fn fill_middle(controller: &mut Controller) -> AnyResult<()> {
    let (w, h) = canvas_size(controller);
    controller.set_tool(Tool::FloodFill)?;
    controller.settings_mut().foreground = drawsync_core::color::Rgba8::opaque(220, 60, 40);
    controller.pen_down(Point::new(w * 0.5, h * 0.5, 1.0)?, false)?;
    controller.pen_up()?;
    Ok(())
}

async fn run(settings: settings::Settings, out_path: std::path::PathBuf) -> AnyResult<()> {
    let (out_tx, out_rx) = mpsc::unbounded_channel::<Outbound>();
    let (in_tx, mut in_rx) = mpsc::unbounded_channel::<Inbound>();
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel::<Notice>();

    let (authority, hangup) = loopback::Loopback::new(
        loopback::LoopbackConfig {
            title: settings.title.clone(),
            password: settings.password.clone(),
            width: settings.width,
            height: settings.height,
        },
        out_rx,
        in_tx,
    );
    let server = tokio::spawn(authority.run());

    let mut controller = Controller::new(settings.controller_config(), out_tx, notice_tx);
    let background = Raster::filled(
        settings.width,
        settings.height,
        controller.settings().background,
    );
    controller.host(&settings.address, settings.host_params(), Some(background))?;
    pump(&mut controller, &mut in_rx, &mut notice_rx).await?;

    controller.create_layer("Ink")?;
    pump(&mut controller, &mut in_rx, &mut notice_rx).await?;
    if let Some(ink) = controller.editor().stack().top() {
        controller.set_layer(ink)?;
    }

    draw_outline(&mut controller)?;
    pump(&mut controller, &mut in_rx, &mut notice_rx).await?;
    // Fills read the authoritative stack, so the outline must have landed first.
    fill_middle(&mut controller)?;
    pump(&mut controller, &mut in_rx, &mut notice_rx).await?;

    let pending = controller.editor().preview().len();
    if pending != 0 {
        log::warn!("{pending} local edits still unacknowledged");
    }
    export::write_png(&controller.flatten(), &out_path)?;

    controller.disconnect();
    // Already gone if it saw the disconnect, in which case this does nothing.
    hangup.hang_up("done");
    server.await?;
    Ok(())
}

fn main() -> AnyResult<()> {
    let has_term = std::io::IsTerminal::is_terminal(&std::io::stdin());
    // Log to a terminal, if available. Else, log to "log.out" in the working directory.
    if has_term {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        let _ = simple_logging::log_to_file("log.out", log::LevelFilter::Debug);
    }

    let out_path: std::path::PathBuf = std::env::args_os()
        .nth(1)
        .map_or_else(|| "drawsync.png".into(), Into::into);

    let settings = settings::Settings::load();
    if settings.did_fail_to_load() {
        // Leave a documented file behind to edit next time.
        if let Err(e) = settings.save() {
            log::warn!("couldn't save default settings: {e:#}");
        }
    }

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(run(settings, out_path))
}
