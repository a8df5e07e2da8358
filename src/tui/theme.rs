//! Colors for the renderer, parsed once from the config.

use ratatui::style::{Color, Modifier, Style};
use tracing::warn;

use crate::azure::ActivationStatus;
use crate::config::ThemeConfig;

/// Immutable color scheme handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub active: Color,
    pub expiring: Color,
    pub inactive: Color,
    pub pending: Color,
    pub error: Color,
    pub highlight: Color,
    pub border: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            active: Color::Green,
            expiring: Color::Yellow,
            inactive: Color::DarkGray,
            pending: Color::Cyan,
            error: Color::Red,
            highlight: Color::Magenta,
            border: Color::Gray,
        }
    }
}

impl Theme {
    /// Build from `#rrggbb` strings; invalid entries keep the default color.
    pub fn from_config(config: &ThemeConfig) -> Self {
        let defaults = Self::default();
        Self {
            active: color_or("active", &config.active, defaults.active),
            expiring: color_or("expiring", &config.expiring, defaults.expiring),
            inactive: color_or("inactive", &config.inactive, defaults.inactive),
            pending: color_or("pending", &config.pending, defaults.pending),
            error: color_or("error", &config.error, defaults.error),
            highlight: color_or("highlight", &config.highlight, defaults.highlight),
            border: color_or("border", &config.border, defaults.border),
        }
    }

    pub fn status_color(&self, status: ActivationStatus) -> Color {
        match status {
            ActivationStatus::Active => self.active,
            ActivationStatus::ExpiringSoon => self.expiring,
            ActivationStatus::Inactive => self.inactive,
            ActivationStatus::Pending => self.pending,
        }
    }

    pub fn border_style(&self) -> Style {
        Style::default().fg(self.border)
    }

    pub fn selected_row_style(&self) -> Style {
        Style::default()
            .fg(self.highlight)
            .add_modifier(Modifier::BOLD | Modifier::REVERSED)
    }

    pub fn title_style(&self) -> Style {
        Style::default()
            .fg(self.highlight)
            .add_modifier(Modifier::BOLD)
    }
}

fn color_or(name: &str, value: &str, fallback: Color) -> Color {
    parse_hex(value).unwrap_or_else(|| {
        warn!("Invalid theme color {} = '{}', using default", name, value);
        fallback
    })
}

/// Parse `#rrggbb` (the `#` is optional).
pub fn parse_hex(value: &str) -> Option<Color> {
    let hex = value.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    Some(Color::Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_parse_hex() {
        assert_eq!(parse_hex("#7d56f4"), Some(Color::Rgb(0x7d, 0x56, 0xf4)));
        assert_eq!(parse_hex("00ff00"), Some(Color::Rgb(0, 255, 0)));
        assert_eq!(parse_hex("#fff"), None);
        assert_eq!(parse_hex("#gg0000"), None);
    }

    #[test]
    fn test_theme_from_config() {
        let mut config = Config::defaults().unwrap().theme;
        config.error = "not a color".to_string();

        let theme = Theme::from_config(&config);
        assert_eq!(theme.active, Color::Rgb(0, 255, 0));
        assert_eq!(theme.error, Theme::default().error);
        assert_eq!(
            theme.status_color(ActivationStatus::ExpiringSoon),
            Color::Rgb(255, 255, 0)
        );
    }
}
