//! Presentation options and the name → setter dispatch table
//!
//! [`ViewerOptions`] is the typed form (config files, snapshots). The
//! [`OPTION_TABLE`] routes string assignments such as `zoom=3` from a command
//! line or control panel to the validated setters of a [`Presentation`].

use crate::error::{ConfigError, Outcome, ViewerError};
use crate::scene::Color;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Persisted presentation state, reapplied to every newly loaded asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerOptions {
    #[serde(default = "default_color")]
    pub background_color: Color,
    #[serde(default = "default_unit")]
    pub background_opacity: f32,
    #[serde(default = "default_color")]
    pub light_color: Color,
    #[serde(default = "default_unit")]
    pub light_intensity: f32,
    #[serde(default)]
    pub auto_rotate_speed: f32,
    #[serde(default = "default_true")]
    pub controls_enabled: bool,
    #[serde(default)]
    pub wireframe: bool,
    #[serde(default)]
    pub bounding_box_overlay: bool,
    #[serde(default = "default_zoom")]
    pub zoom: f32,
    #[serde(default = "default_vertical_offset")]
    pub vertical_offset: f32,
    #[serde(default)]
    pub animation_clips: Vec<String>,
    #[serde(default = "default_unit")]
    pub animation_speed: f32,
}

fn default_color() -> Color {
    Color::WHITE
}

fn default_unit() -> f32 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_zoom() -> f32 {
    2.0
}

fn default_vertical_offset() -> f32 {
    5.0
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            background_color: default_color(),
            background_opacity: default_unit(),
            light_color: default_color(),
            light_intensity: default_unit(),
            auto_rotate_speed: 0.0,
            controls_enabled: default_true(),
            wireframe: false,
            bounding_box_overlay: false,
            zoom: default_zoom(),
            vertical_offset: default_vertical_offset(),
            animation_clips: Vec::new(),
            animation_speed: default_unit(),
        }
    }
}

impl ViewerOptions {
    /// Push every option through `target`'s setters, stopping at the first rejection
    pub fn apply_to(&self, target: &mut dyn Presentation) -> Result<(), ConfigError> {
        target.set_background(self.background_color, self.background_opacity)?;
        target.set_light(self.light_color, self.light_intensity)?;
        target.set_auto_rotate(self.auto_rotate_speed)?;
        target.enable_controls(self.controls_enabled)?;
        target.set_wireframe(self.wireframe)?;
        target.set_bounding_box_overlay(self.bounding_box_overlay)?;
        target.set_framing(self.zoom, self.vertical_offset)?;
        target.set_animation_speed(self.animation_speed)?;
        target.set_animation_clips(&self.animation_clips)?;
        Ok(())
    }
}

/// The setter surface a configuration source drives
///
/// Every setter validates before mutating: on `Err` the persisted value is
/// unchanged. `Ok(Outcome::NoAssetLoaded)` means the value was persisted and
/// will be applied once an asset is attached.
pub trait Presentation {
    fn options(&self) -> &ViewerOptions;
    fn set_background(&mut self, color: Color, opacity: f32) -> Result<Outcome, ViewerError>;
    fn set_light(&mut self, color: Color, intensity: f32) -> Result<Outcome, ViewerError>;
    fn set_auto_rotate(&mut self, speed: f32) -> Result<Outcome, ViewerError>;
    fn enable_controls(&mut self, enabled: bool) -> Result<Outcome, ViewerError>;
    fn set_wireframe(&mut self, enabled: bool) -> Result<Outcome, ViewerError>;
    fn set_bounding_box_overlay(&mut self, enabled: bool) -> Result<Outcome, ViewerError>;
    fn set_framing(&mut self, zoom: f32, vertical_offset: f32) -> Result<Outcome, ViewerError>;
    fn set_animation_clips(&mut self, clips: &[String]) -> Result<Outcome, ViewerError>;
    fn set_animation_speed(&mut self, speed: f32) -> Result<Outcome, ViewerError>;
}

pub type Setter = fn(&mut dyn Presentation, &str) -> Result<Outcome, ConfigError>;

/// One row of the dispatch table
pub struct OptionEntry {
    pub name: &'static str,
    /// Human-readable value format, for help text and errors
    pub expects: &'static str,
    pub apply: Setter,
}

impl std::fmt::Debug for OptionEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptionEntry")
            .field("name", &self.name)
            .field("expects", &self.expects)
            .finish()
    }
}

const COLOR: &str = "a color (#rgb, #rrggbb or 0xrrggbb)";
const NUMBER: &str = "a number";
const BOOL: &str = "a boolean";
const CLIPS: &str = "a comma-separated list of clip names";

pub static OPTION_TABLE: &[OptionEntry] = &[
    OptionEntry {
        name: "backgroundColor",
        expects: COLOR,
        apply: |p, v| {
            let color = parse_color("backgroundColor", v)?;
            let opacity = p.options().background_opacity;
            Ok(p.set_background(color, opacity)?)
        },
    },
    OptionEntry {
        name: "backgroundOpacity",
        expects: NUMBER,
        apply: |p, v| {
            let opacity = parse_number("backgroundOpacity", v)?;
            let color = p.options().background_color;
            Ok(p.set_background(color, opacity)?)
        },
    },
    OptionEntry {
        name: "lightColor",
        expects: COLOR,
        apply: |p, v| {
            let color = parse_color("lightColor", v)?;
            let intensity = p.options().light_intensity;
            Ok(p.set_light(color, intensity)?)
        },
    },
    OptionEntry {
        name: "lightIntensity",
        expects: NUMBER,
        apply: |p, v| {
            let intensity = parse_number("lightIntensity", v)?;
            let color = p.options().light_color;
            Ok(p.set_light(color, intensity)?)
        },
    },
    OptionEntry {
        name: "autoRotateSpeed",
        expects: NUMBER,
        apply: |p, v| Ok(p.set_auto_rotate(parse_number("autoRotateSpeed", v)?)?),
    },
    OptionEntry {
        name: "controlsEnabled",
        expects: BOOL,
        apply: |p, v| Ok(p.enable_controls(parse_bool("controlsEnabled", v)?)?),
    },
    OptionEntry {
        name: "wireframe",
        expects: BOOL,
        apply: |p, v| Ok(p.set_wireframe(parse_bool("wireframe", v)?)?),
    },
    OptionEntry {
        name: "boundingBoxOverlay",
        expects: BOOL,
        apply: |p, v| Ok(p.set_bounding_box_overlay(parse_bool("boundingBoxOverlay", v)?)?),
    },
    OptionEntry {
        name: "zoom",
        expects: NUMBER,
        apply: |p, v| {
            let zoom = parse_number("zoom", v)?;
            let vertical_offset = p.options().vertical_offset;
            Ok(p.set_framing(zoom, vertical_offset)?)
        },
    },
    OptionEntry {
        name: "verticalOffset",
        expects: NUMBER,
        apply: |p, v| {
            let vertical_offset = parse_number("verticalOffset", v)?;
            let zoom = p.options().zoom;
            Ok(p.set_framing(zoom, vertical_offset)?)
        },
    },
    OptionEntry {
        name: "animationClips",
        expects: CLIPS,
        apply: |p, v| Ok(p.set_animation_clips(&parse_clip_list(v))?),
    },
    OptionEntry {
        name: "animationSpeed",
        expects: NUMBER,
        apply: |p, v| Ok(p.set_animation_speed(parse_number("animationSpeed", v)?)?),
    },
];

pub fn find_option(name: &str) -> Option<&'static OptionEntry> {
    OPTION_TABLE.iter().find(|entry| entry.name == name)
}

/// Route `value` to the setter registered for `name`
pub fn apply_option(
    target: &mut dyn Presentation,
    name: &str,
    value: &str,
) -> Result<Outcome, ConfigError> {
    let entry = find_option(name).ok_or_else(|| ConfigError::UnknownOption(name.to_string()))?;
    let outcome = (entry.apply)(target, value)?;
    debug!(option = %name, value = %value, ?outcome, "Option applied");
    Ok(outcome)
}

/// Apply a `name=value` assignment
pub fn apply_assignment(target: &mut dyn Presentation, assignment: &str) -> Result<Outcome, ConfigError> {
    let (name, value) = assignment.split_once('=').ok_or_else(|| ConfigError::BadValue {
        name: assignment.to_string(),
        expected: "name=value",
        value: assignment.to_string(),
    })?;
    apply_option(target, name.trim(), value.trim())
}

fn bad_value(name: &str, expected: &'static str, value: &str) -> ConfigError {
    ConfigError::BadValue {
        name: name.to_string(),
        expected,
        value: value.to_string(),
    }
}

pub fn parse_color(name: &str, value: &str) -> Result<Color, ConfigError> {
    Color::parse(value).ok_or_else(|| bad_value(name, COLOR, value))
}

pub fn parse_number(name: &str, value: &str) -> Result<f32, ConfigError> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| bad_value(name, NUMBER, value))
}

pub fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(bad_value(name, BOOL, value)),
    }
}

/// Comma separated, blanks dropped; an empty string is an empty list
pub fn parse_clip_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Stores options after the same range checks the session performs
    #[derive(Default)]
    struct Recorder {
        options: ViewerOptions,
        calls: Vec<&'static str>,
    }

    impl Presentation for Recorder {
        fn options(&self) -> &ViewerOptions {
            &self.options
        }

        fn set_background(&mut self, color: Color, opacity: f32) -> Result<Outcome, ViewerError> {
            if !(0.0..=1.0).contains(&opacity) {
                return Err(ViewerError::invalid("backgroundOpacity", "out of range"));
            }
            self.calls.push("background");
            self.options.background_color = color;
            self.options.background_opacity = opacity;
            Ok(Outcome::NoAssetLoaded)
        }

        fn set_light(&mut self, color: Color, intensity: f32) -> Result<Outcome, ViewerError> {
            self.calls.push("light");
            self.options.light_color = color;
            self.options.light_intensity = intensity;
            Ok(Outcome::NoAssetLoaded)
        }

        fn set_auto_rotate(&mut self, speed: f32) -> Result<Outcome, ViewerError> {
            self.calls.push("autoRotate");
            self.options.auto_rotate_speed = speed;
            Ok(Outcome::Applied)
        }

        fn enable_controls(&mut self, enabled: bool) -> Result<Outcome, ViewerError> {
            self.calls.push("controls");
            self.options.controls_enabled = enabled;
            Ok(Outcome::Applied)
        }

        fn set_wireframe(&mut self, enabled: bool) -> Result<Outcome, ViewerError> {
            self.calls.push("wireframe");
            self.options.wireframe = enabled;
            Ok(Outcome::NoAssetLoaded)
        }

        fn set_bounding_box_overlay(&mut self, enabled: bool) -> Result<Outcome, ViewerError> {
            self.calls.push("overlay");
            self.options.bounding_box_overlay = enabled;
            Ok(Outcome::NoAssetLoaded)
        }

        fn set_framing(&mut self, zoom: f32, vertical_offset: f32) -> Result<Outcome, ViewerError> {
            if zoom <= 0.0 || vertical_offset <= 0.0 {
                return Err(ViewerError::invalid("zoom", "must be positive"));
            }
            self.calls.push("framing");
            self.options.zoom = zoom;
            self.options.vertical_offset = vertical_offset;
            Ok(Outcome::NoAssetLoaded)
        }

        fn set_animation_clips(&mut self, clips: &[String]) -> Result<Outcome, ViewerError> {
            self.calls.push("clips");
            self.options.animation_clips = clips.to_vec();
            Ok(Outcome::NoAssetLoaded)
        }

        fn set_animation_speed(&mut self, speed: f32) -> Result<Outcome, ViewerError> {
            self.calls.push("speed");
            self.options.animation_speed = speed;
            Ok(Outcome::NoAssetLoaded)
        }
    }

    #[test]
    fn test_defaults_from_empty_document() {
        let options: ViewerOptions = toml::from_str("").unwrap();
        assert_eq!(options, ViewerOptions::default());
        assert_eq!(options.zoom, 2.0);
        assert_eq!(options.vertical_offset, 5.0);
        assert!(options.controls_enabled);
    }

    #[test]
    fn test_camel_case_fields() {
        let options: ViewerOptions = serde_json::from_str(
            r##"{"backgroundColor":"#000","boundingBoxOverlay":true,"animationClips":["Walk"]}"##,
        )
        .unwrap();
        assert_eq!(options.background_color, Color::rgb(0, 0, 0));
        assert!(options.bounding_box_overlay);
        assert_eq!(options.animation_clips, vec!["Walk".to_string()]);
        assert_eq!(options.light_intensity, 1.0);
    }

    #[test]
    fn test_every_option_is_dispatchable() {
        let mut target = Recorder::default();
        for (name, value) in [
            ("backgroundColor", "#102030"),
            ("backgroundOpacity", "0.5"),
            ("lightColor", "fff"),
            ("lightIntensity", "2"),
            ("autoRotateSpeed", "-1.5"),
            ("controlsEnabled", "off"),
            ("wireframe", "yes"),
            ("boundingBoxOverlay", "1"),
            ("zoom", "3"),
            ("verticalOffset", "4"),
            ("animationClips", "Walk, Idle"),
            ("animationSpeed", "0.25"),
        ] {
            apply_option(&mut target, name, value).unwrap();
        }
        let o = &target.options;
        assert_eq!(o.background_color, Color::rgb(0x10, 0x20, 0x30));
        assert_eq!(o.background_opacity, 0.5);
        assert_eq!(o.auto_rotate_speed, -1.5);
        assert!(!o.controls_enabled);
        assert!(o.wireframe && o.bounding_box_overlay);
        assert_eq!((o.zoom, o.vertical_offset), (3.0, 4.0));
        assert_eq!(o.animation_clips, vec!["Walk", "Idle"]);
        assert_eq!(OPTION_TABLE.len(), 12);
    }

    #[test]
    fn test_failed_setter_keeps_prior_value() {
        let mut target = Recorder::default();
        apply_option(&mut target, "zoom", "3").unwrap();
        let err = apply_option(&mut target, "zoom", "0").unwrap_err();
        assert!(matches!(err, ConfigError::Rejected(ViewerError::InvalidParameter { .. })));
        assert_eq!(target.options.zoom, 3.0);

        let err = apply_option(&mut target, "backgroundOpacity", "1.5").unwrap_err();
        assert!(matches!(err, ConfigError::Rejected(_)));
        assert_eq!(target.options.background_opacity, 1.0);
    }

    #[test]
    fn test_bad_values_and_unknown_names() {
        let mut target = Recorder::default();
        assert_eq!(
            apply_option(&mut target, "fog", "1"),
            Err(ConfigError::UnknownOption("fog".into()))
        );
        assert!(matches!(
            apply_option(&mut target, "wireframe", "maybe"),
            Err(ConfigError::BadValue { expected: BOOL, .. })
        ));
        assert!(matches!(
            apply_option(&mut target, "lightColor", "#ggg"),
            Err(ConfigError::BadValue { .. })
        ));
        assert!(matches!(
            apply_option(&mut target, "zoom", "NaN"),
            Err(ConfigError::BadValue { .. })
        ));
        assert!(target.calls.is_empty());
    }

    #[test]
    fn test_assignment_syntax() {
        let mut target = Recorder::default();
        apply_assignment(&mut target, " wireframe = true ").unwrap();
        assert!(target.options.wireframe);
        assert!(matches!(
            apply_assignment(&mut target, "wireframe"),
            Err(ConfigError::BadValue { expected: "name=value", .. })
        ));
    }

    #[test]
    fn test_apply_to_pushes_everything() {
        let options = ViewerOptions {
            wireframe: true,
            zoom: 3.0,
            ..Default::default()
        };
        let mut target = Recorder::default();
        options.apply_to(&mut target).unwrap();
        assert_eq!(target.options, options);
        assert_eq!(target.calls.len(), 9);
    }

    #[test]
    fn test_clip_list_parsing() {
        assert_eq!(parse_clip_list("Walk,,Idle ,"), vec!["Walk", "Idle"]);
        assert!(parse_clip_list("").is_empty());
    }
}
