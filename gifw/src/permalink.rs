//! Permalink fragment codec.
//!
//! The fragment has the form
//!
//! ```text
//! #map={zoom}/{lon}/{lat}/{rotation}&layers={id}/{opacity}/{saturation}/{style}/{filter},...
//!     &basemap={id}/{opacity}/{saturation}&sr={x},{y}&srepsg={epsg}&srt={pin text}
//! ```
//!
//! Filters and the search pin text are URL-safe base64 without padding. Decoding accepts padded
//! values too. In layer ids and style names the separators `/ , & = #` and `%` are
//! percent-encoded.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::GifwError;

/// View part of the permalink.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewState {
    /// Zoom level.
    pub zoom: f64,
    /// Longitude of the center.
    pub lon: f64,
    /// Latitude of the center.
    pub lat: f64,
    /// Rotation in radians.
    pub rotation: f64,
}

/// Visible overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerState {
    /// Layer id.
    pub id: String,
    /// Opacity, 0-100.
    pub opacity: u8,
    /// Saturation, 0-100.
    pub saturation: u8,
    /// Server style name.
    pub style: Option<String>,
    /// CQL filter without the locked default part.
    pub filter: Option<String>,
}

/// Visible basemap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasemapState {
    /// Layer id.
    pub id: String,
    /// Opacity, 0-100.
    pub opacity: u8,
    /// Saturation, 0-100.
    pub saturation: u8,
}

/// Pin placed by a search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPin {
    /// X coordinate in the CRS of `epsg`.
    pub x: f64,
    /// Y coordinate in the CRS of `epsg`.
    pub y: f64,
    /// EPSG code of the coordinates.
    pub epsg: u32,
    /// Popup title.
    pub title: String,
    /// Popup content.
    pub content: String,
}

#[derive(Serialize, Deserialize)]
struct PinText {
    title: String,
    content: String,
}

/// Map state stored in the permalink.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PermalinkState {
    /// View. `None` if the fragment has no `map` part.
    pub view: Option<ViewState>,
    /// Visible overlays.
    pub layers: Vec<LayerState>,
    /// Visible basemap.
    pub basemap: Option<BasemapState>,
    /// Search pin.
    pub search_pin: Option<SearchPin>,
}

fn format_number(value: f64, decimals: usize) -> String {
    let formatted = format!("{value:.decimals$}");
    let trimmed = if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.')
    } else {
        &formatted
    };

    match trimmed {
        "-0" => "0".to_string(),
        other => other.to_string(),
    }
}

fn encode_text(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(text.as_bytes())
}

fn decode_text(value: &str) -> Result<String, GifwError> {
    let bytes = URL_SAFE_NO_PAD.decode(value.trim_end_matches('='))?;
    String::from_utf8(bytes).map_err(|err| GifwError::Decoding(err.to_string()))
}

const RESERVED: &[char] = &['%', '/', ',', '&', '=', '#'];

fn escape_component(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if RESERVED.contains(&c) {
            escaped.push_str(&format!("%{:02X}", c as u32));
        } else {
            escaped.push(c);
        }
    }
    escaped
}

fn unescape_component(value: &str) -> Result<String, GifwError> {
    if !value.contains('%') {
        return Ok(value.to_string());
    }

    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = value
                .get(i + 1..i + 3)
                .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                .ok_or_else(|| invalid(format!("invalid escape in {value:?}")))?;
            decoded.push(byte);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(decoded).map_err(|err| invalid(err.to_string()))
}

/// Encodes the state into a URL fragment starting with `#`.
pub fn encode(state: &PermalinkState) -> String {
    let mut parts = vec![];

    if let Some(view) = &state.view {
        parts.push(format!(
            "map={:.2}/{:.5}/{:.5}/{}",
            view.zoom,
            view.lon,
            view.lat,
            format_number(view.rotation, 4)
        ));
    }

    if !state.layers.is_empty() {
        let layers: Vec<String> = state
            .layers
            .iter()
            .map(|layer| {
                format!(
                    "{}/{}/{}/{}/{}",
                    escape_component(&layer.id),
                    layer.opacity,
                    layer.saturation,
                    layer.style.as_deref().map(escape_component).unwrap_or_default(),
                    layer.filter.as_deref().map(encode_text).unwrap_or_default()
                )
            })
            .collect();
        parts.push(format!("layers={}", layers.join(",")));
    }

    if let Some(basemap) = &state.basemap {
        parts.push(format!(
            "basemap={}/{}/{}",
            escape_component(&basemap.id),
            basemap.opacity,
            basemap.saturation
        ));
    }

    if let Some(pin) = &state.search_pin {
        parts.push(format!("sr={},{}", format_number(pin.x, 6), format_number(pin.y, 6)));
        parts.push(format!("srepsg={}", pin.epsg));
        let text = PinText {
            title: pin.title.clone(),
            content: pin.content.clone(),
        };
        if let Ok(json) = serde_json::to_string(&text) {
            parts.push(format!("srt={}", encode_text(&json)));
        }
    }

    format!("#{}", parts.join("&"))
}

fn invalid(message: impl Into<String>) -> GifwError {
    GifwError::InvalidPermalink(message.into())
}

fn parse_f64(value: &str, name: &str) -> Result<f64, GifwError> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(format!("{name} is not a number: {value:?}")))
}

fn parse_percent(value: &str, name: &str) -> Result<u8, GifwError> {
    value
        .parse::<u8>()
        .ok()
        .filter(|v| *v <= 100)
        .ok_or_else(|| invalid(format!("{name} must be between 0 and 100: {value:?}")))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn decode_view(value: &str) -> Result<ViewState, GifwError> {
    let parts: Vec<&str> = value.split('/').collect();
    if parts.len() < 3 {
        return Err(invalid(format!("map part needs zoom, lon and lat: {value:?}")));
    }

    Ok(ViewState {
        zoom: parse_f64(parts[0], "zoom")?,
        lon: parse_f64(parts[1], "longitude")?,
        lat: parse_f64(parts[2], "latitude")?,
        rotation: match non_empty(parts.get(3).copied()) {
            Some(rotation) => parse_f64(rotation, "rotation")?,
            None => 0.0,
        },
    })
}

fn decode_layer(value: &str) -> Result<LayerState, GifwError> {
    let mut parts = value.split('/');
    let id = non_empty(parts.next()).ok_or_else(|| invalid("layer without id"))?;
    let opacity = match non_empty(parts.next()) {
        Some(v) => parse_percent(v, "opacity")?,
        None => 100,
    };
    let saturation = match non_empty(parts.next()) {
        Some(v) => parse_percent(v, "saturation")?,
        None => 100,
    };
    let style = non_empty(parts.next()).map(unescape_component).transpose()?;
    let filter = non_empty(parts.next()).map(decode_text).transpose()?;

    Ok(LayerState {
        id: unescape_component(id)?,
        opacity,
        saturation,
        style,
        filter,
    })
}

fn decode_basemap(value: &str) -> Result<BasemapState, GifwError> {
    let mut parts = value.split('/');
    let id = non_empty(parts.next()).ok_or_else(|| invalid("basemap without id"))?;
    let opacity = match non_empty(parts.next()) {
        Some(v) => parse_percent(v, "opacity")?,
        None => 100,
    };
    let saturation = match non_empty(parts.next()) {
        Some(v) => parse_percent(v, "saturation")?,
        None => 100,
    };

    Ok(BasemapState {
        id: unescape_component(id)?,
        opacity,
        saturation,
    })
}

/// Decodes a URL fragment with or without the leading `#`. Unknown keys are ignored.
pub fn decode(fragment: &str) -> Result<PermalinkState, GifwError> {
    let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
    let mut state = PermalinkState::default();
    let mut pin_coords = None;
    let mut pin_epsg = None;
    let mut pin_text = None;

    for pair in fragment.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "map" => state.view = Some(decode_view(value)?),
            "layers" => {
                state.layers = value
                    .split(',')
                    .filter(|l| !l.is_empty())
                    .map(decode_layer)
                    .collect::<Result<_, _>>()?;
            }
            "basemap" => state.basemap = Some(decode_basemap(value)?),
            "sr" => {
                let (x, y) = value
                    .split_once(',')
                    .ok_or_else(|| invalid(format!("search pin needs x,y: {value:?}")))?;
                pin_coords = Some((parse_f64(x, "pin x")?, parse_f64(y, "pin y")?));
            }
            "srepsg" => {
                pin_epsg = Some(
                    value
                        .parse::<u32>()
                        .map_err(|_| invalid(format!("invalid pin EPSG code: {value:?}")))?,
                );
            }
            "srt" => {
                let json = decode_text(value)?;
                pin_text = Some(serde_json::from_str::<PinText>(&json)?);
            }
            other => log::debug!("Ignoring unknown permalink part {other}"),
        }
    }

    if let Some((x, y)) = pin_coords {
        let text = pin_text.unwrap_or(PinText {
            title: String::new(),
            content: String::new(),
        });
        state.search_pin = Some(SearchPin {
            x,
            y,
            epsg: pin_epsg.unwrap_or(3857),
            title: text.title,
            content: text.content,
        });
    }

    Ok(state)
}
