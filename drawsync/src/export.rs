use drawsync_core::raster::Raster;

#[derive(thiserror::Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Png(#[from] png::EncodingError),
}

/// Encode as an 8-bit RGBA png.
pub fn encode(raster: &Raster, into: impl std::io::Write) -> Result<(), ExportError> {
    let mut encoder = png::Encoder::new(into, raster.width(), raster.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(raster.as_bytes())?;
    writer.finish()?;
    Ok(())
}

pub fn write_png(raster: &Raster, path: &std::path::Path) -> Result<(), ExportError> {
    let file = std::io::BufWriter::new(std::fs::File::create(path)?);
    encode(raster, file)?;
    log::info!(
        "Wrote {}x{} image to {path:?}",
        raster.width(),
        raster.height()
    );
    Ok(())
}
