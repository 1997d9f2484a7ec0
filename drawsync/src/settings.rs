use drawsync_core::{
    color::Rgba8,
    controller::ControllerConfig,
    session::HostParams,
    tools::ToolSettings,
    util::FiniteF32,
};

const DOCUMENTATION: &str = r#"# Drawsync settings. You may edit this file, but be aware that formatting and comments will not
# be preserved. Missing keys take their default value.

# Colors are [red, green, blue, alpha], 0-255.
# `fill_tolerance` is the largest per-channel difference a flood fill will still spread into.

"#;

#[must_use]
pub fn preferences_dir() -> Option<std::path::PathBuf> {
    let mut base_dir = dirs::preference_dir()?;
    base_dir.push(env!("CARGO_PKG_NAME"));
    Some(base_dir)
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ToolSection {
    pub foreground: [u8; 4],
    pub background: [u8; 4],
    pub brush_radius: f32,
    pub eraser_radius: f32,
    pub fill_tolerance: u8,
    pub sample_merged: bool,
}
impl Default for ToolSection {
    fn default() -> Self {
        let tools = ToolSettings::default();
        Self {
            foreground: tools.foreground.into(),
            background: tools.background.into(),
            brush_radius: tools.brush_radius.get(),
            eraser_radius: tools.eraser_radius.get(),
            fill_tolerance: tools.fill_tolerance,
            sample_merged: tools.sample_merged,
        }
    }
}
impl ToolSection {
    fn to_settings(&self) -> ToolSettings {
        let defaults = ToolSettings::default();
        let radius = |value: f32, default: FiniteF32| {
            FiniteF32::new(value).unwrap_or_else(|_| {
                log::warn!("Radius {value} is not finite, using {}", default.get());
                default
            })
        };
        ToolSettings {
            foreground: Rgba8::from(self.foreground),
            background: Rgba8::from(self.background),
            brush_radius: radius(self.brush_radius, defaults.brush_radius),
            eraser_radius: radius(self.eraser_radius, defaults.eraser_radius),
            fill_tolerance: self.fill_tolerance,
            sample_merged: self.sample_merged,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub username: String,
    pub address: String,
    /// Title of sessions we host.
    pub title: String,
    pub password: Option<String>,
    pub width: u32,
    pub height: u32,
    pub notify_capacity: usize,
    pub tools: ToolSection,
    #[serde(skip)]
    failed_to_load: bool,
}
impl Default for Settings {
    fn default() -> Self {
        let config = ControllerConfig::default();
        Self {
            username: config.username,
            address: String::from("loopback"),
            title: String::from("Untitled"),
            password: None,
            width: config.width,
            height: config.height,
            notify_capacity: config.notify_capacity,
            tools: ToolSection::default(),
            failed_to_load: false,
        }
    }
}
impl Settings {
    const FILENAME: &'static str = "settings.toml";
    /// Load from the user preferences, or default if unavailable for some reason.
    #[must_use]
    pub fn load() -> Self {
        match preferences_dir() {
            None => Self::no_path(),
            Some(mut dir) => {
                dir.push(Self::FILENAME);
                Self::load_or_default(&dir)
            }
        }
    }
    #[must_use]
    pub fn no_path() -> Self {
        log::warn!("Settings weren't available, defaulting.");
        Self {
            failed_to_load: true,
            ..Self::default()
        }
    }
    #[must_use]
    fn load_or_default(path: &std::path::Path) -> Self {
        let load = || -> anyhow::Result<Self> {
            let string = std::fs::read_to_string(path)?;
            Ok(Self::parse(&string)?)
        };
        match load() {
            Ok(settings) => settings,
            Err(e) => {
                log::debug!("failed to load {path:?}: {e:#}");
                Self::no_path()
            }
        }
    }
    pub fn parse(string: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(string)
    }
    /// Return true if loading user's settings failed.
    #[must_use]
    pub fn did_fail_to_load(&self) -> bool {
        self.failed_to_load
    }
    pub fn to_toml(&self) -> anyhow::Result<String> {
        let string = toml::ser::to_string_pretty(self)?;
        Ok(DOCUMENTATION.to_owned() + &string)
    }
    pub fn save(&self) -> anyhow::Result<()> {
        let mut preferences =
            preferences_dir().ok_or_else(|| anyhow::anyhow!("No preferences dir found"))?;
        // Not recursive. If the preferences dir itself is missing, leave it be.
        let _ = std::fs::DirBuilder::new().create(&preferences);

        preferences.push(Self::FILENAME);
        std::fs::write(preferences, self.to_toml()?)?;
        Ok(())
    }
    #[must_use]
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            username: self.username.clone(),
            tools: self.tools.to_settings(),
            width: self.width,
            height: self.height,
            notify_capacity: self.notify_capacity,
        }
    }
    #[must_use]
    pub fn host_params(&self) -> HostParams {
        HostParams {
            title: self.title.clone(),
            password: self.password.clone(),
            width: self.width,
            height: self.height,
        }
    }
}
