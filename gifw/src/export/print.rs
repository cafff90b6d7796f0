//! Printing the map into a PDF document.
//!
//! A print resizes the map to the paper size at the requested resolution, renders it through a
//! [`MapRenderer`] and composes the page through a [`PdfSink`]: the map image, a title box with
//! the subtitle and date, a coordinates box, an attribution box, the logo and the legend.
//!
//! The view of the map is changed for the duration of the print only. It is held by a
//! [`ViewRestoreGuard`] that puts the previous size, resolution and center back on every exit
//! path: success, failure, abort and timeout.

use std::io::Cursor;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::{join_all, AbortHandle, AbortRegistration};
use gifw_types::cartesian::{Rect, Size};
use gifw_types::geo::Crs;
use log::{debug, info, warn};
use maybe_sync::{MaybeSend, MaybeSync};
use serde::{Deserialize, Serialize};

use crate::async_runtime::with_deadline;
use crate::auth::AuthManager;
use crate::engine::{LegendUrl, Session};
use crate::error::{GifwError, ValidationIssue};
use crate::map::Map;
use crate::platform::{fetch_json, send_checked, HttpRequest, HttpService};
use crate::view::MapView;

/// Time after which a print is given up.
pub const PRINT_TIMEOUT: Duration = Duration::from_secs(60);

const MM_PER_INCH: f64 = 25.4;
/// Resolution legend images are drawn at by the map servers.
const SCREEN_DPI: f64 = 96.0;

const MARGIN_MM: f64 = 10.0;
const TITLE_BOX_HEIGHT_MM: f64 = 18.0;
const FOOTER_HEIGHT_MM: f64 = 8.0;
const GAP_MM: f64 = 2.0;
const LOGO_SIZE_MM: f64 = 14.0;

const LEGEND_FONT_SIZE_PT: f64 = 9.0;
const LEGEND_TITLE_HEIGHT_MM: f64 = 5.0;
const LEGEND_PADDING_MM: f64 = 2.0;
/// Average glyph width of the legend font as a share of the font size.
const GLYPH_WIDTH_RATIO: f64 = 0.5;

/// Share of the map frame a floated legend may cover.
const FLOAT_MAX_WIDTH: f64 = 0.3;
const FLOAT_MAX_HEIGHT: f64 = 0.4;
/// Share of the page width an inline legend column may take.
const INLINE_MAX_WIDTH: f64 = 0.25;

const DEFAULT_LEGEND_IMAGE: Size = Size::new(20.0, 20.0);

/// Paper offered in the print dialog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperSize {
    /// Display name, e.g. `A4`.
    pub name: String,
    /// Width of the portrait page in millimetres.
    pub width_mm: f64,
    /// Height of the portrait page in millimetres.
    pub height_mm: f64,
}

impl PaperSize {
    /// Page size in millimetres in the orientation.
    pub fn page_size(&self, orientation: Orientation) -> Size {
        match orientation {
            Orientation::Portrait => Size::new(self.width_mm, self.height_mm),
            Orientation::Landscape => Size::new(self.height_mm, self.width_mm),
        }
    }
}

/// Page orientation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Taller than wide.
    Portrait,
    /// Wider than tall.
    #[default]
    Landscape,
}

/// Print options served by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintConfiguration {
    /// Available paper sizes.
    pub paper_sizes: Vec<PaperSize>,
    /// Resolutions offered to the user.
    #[serde(default = "default_resolutions")]
    pub resolutions: Vec<u32>,
    /// Title used when the user gives none.
    #[serde(default)]
    pub default_title: Option<String>,
    /// Logo drawn in the title box.
    #[serde(default)]
    pub logo_url: Option<String>,
    /// Text drawn after the layer attributions.
    #[serde(default)]
    pub attribution: Option<String>,
}

fn default_resolutions() -> Vec<u32> {
    vec![96, 150, 300]
}

impl PrintConfiguration {
    /// Loads the print configuration from the backend.
    pub async fn fetch(
        http: &dyn HttpService,
        endpoint: &str,
        auth: &AuthManager,
    ) -> Result<Self, GifwError> {
        let config: Self = fetch_json(http, auth.authorize(HttpRequest::get(endpoint))).await?;
        if config.paper_sizes.is_empty() {
            return Err(GifwError::Configuration(
                "print configuration has no paper sizes".into(),
            ));
        }

        Ok(config)
    }

    /// Paper with the name, ignoring case.
    pub fn paper(&self, name: &str) -> Option<&PaperSize> {
        self.paper_sizes
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

/// Options chosen in the print dialog.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintRequest {
    /// Title.
    pub title: String,
    /// Subtitle under the title.
    pub subtitle: Option<String>,
    /// Paper.
    pub paper: PaperSize,
    /// Orientation.
    pub orientation: Orientation,
    /// Resolution of the map image.
    pub dpi: u32,
    /// Whether the legend is printed.
    pub include_legend: bool,
    /// CRS of the printed center coordinates.
    pub coordinate_crs: Crs,
    /// Decimals of the printed center coordinates.
    pub coordinate_decimals: usize,
    /// Date printed in the title box.
    pub date: DateTime<Utc>,
}

impl PrintRequest {
    /// Creates a landscape request at 150 dpi with the legend, dated now.
    pub fn new(title: impl Into<String>, paper: PaperSize) -> Self {
        Self {
            title: title.into(),
            subtitle: None,
            paper,
            orientation: Orientation::default(),
            dpi: 150,
            include_legend: true,
            coordinate_crs: Crs::EPSG4326,
            coordinate_decimals: 5,
            date: Utc::now(),
        }
    }

    /// Sets the subtitle.
    pub fn with_subtitle(mut self, subtitle: impl Into<String>) -> Self {
        self.subtitle = Some(subtitle.into());
        self
    }

    /// Sets the orientation.
    pub fn with_orientation(mut self, orientation: Orientation) -> Self {
        self.orientation = orientation;
        self
    }

    /// Sets the resolution of the map image.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.dpi = dpi;
        self
    }

    /// Sets whether the legend is printed.
    pub fn with_legend(mut self, include: bool) -> Self {
        self.include_legend = include;
        self
    }

    /// Sets the CRS and decimals of the printed coordinates.
    pub fn with_coordinates(mut self, crs: Crs, decimals: usize) -> Self {
        self.coordinate_crs = crs;
        self.coordinate_decimals = decimals;
        self
    }

    /// Sets the printed date.
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = date;
        self
    }

    fn validate(&self) -> Result<(), GifwError> {
        let mut issues = vec![];
        if self.title.trim().is_empty() {
            issues.push(ValidationIssue::new("title", "A title is required"));
        }
        if !(72..=600).contains(&self.dpi) {
            issues.push(ValidationIssue::new(
                "dpi",
                "The resolution must be between 72 and 600 dpi",
            ));
        }
        if self.paper.width_mm <= 2.0 * MARGIN_MM || self.paper.height_mm <= 2.0 * MARGIN_MM {
            issues.push(ValidationIssue::new("paper", "The paper is too small"));
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(GifwError::Validation(issues))
        }
    }
}

/// Where the legend is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LegendLayout {
    /// Nothing to show.
    None,
    /// Column left of the map. The map frame is narrowed.
    InlineLeft,
    /// Box drawn over the left side of the map.
    FloatedLeft,
    /// Page after the map page.
    SeparatePage,
}

/// Legend image with its size in pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct LegendImage {
    /// Layer name drawn above the image.
    pub layer_name: String,
    /// Image data.
    pub data: Bytes,
    /// Image size in pixels.
    pub size: Size,
}

impl LegendImage {
    /// Creates the entry, reading the size from the image header.
    pub fn new(layer_name: impl Into<String>, data: Bytes) -> Self {
        let layer_name = layer_name.into();
        let size = match image_size(&data) {
            Ok(size) => size,
            Err(err) => {
                warn!("Failed to read the size of the legend of {layer_name}: {err}");
                DEFAULT_LEGEND_IMAGE
            }
        };
        Self {
            layer_name,
            data,
            size,
        }
    }

    fn size_mm(&self) -> Size {
        let to_mm = |px: f64| px / SCREEN_DPI * MM_PER_INCH;
        Size::new(to_mm(self.size.width()), to_mm(self.size.height()))
    }
}

/// Size in pixels of a PNG, GIF or JPEG image. The format is guessed from the data.
pub fn image_size(data: &[u8]) -> Result<Size, GifwError> {
    let (width, height) = image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|err| GifwError::Decoding(err.to_string()))?
        .into_dimensions()
        .map_err(|err| GifwError::Decoding(err.to_string()))?;
    Ok(Size::new(width as f64, height as f64))
}

fn points_to_mm(points: f64) -> f64 {
    points / 72.0 * MM_PER_INCH
}

/// Size of the legend column in millimetres.
pub fn measure_legend(images: &[LegendImage]) -> Size {
    if images.is_empty() {
        return Size::new(0.0, 0.0);
    }

    let glyph_width = points_to_mm(LEGEND_FONT_SIZE_PT) * GLYPH_WIDTH_RATIO;
    let mut width: f64 = 0.0;
    let mut height = 0.0;
    for image in images {
        let image_size = image.size_mm();
        let title_width = image.layer_name.chars().count() as f64 * glyph_width;
        width = width.max(title_width).max(image_size.width());
        height += LEGEND_TITLE_HEIGHT_MM + image_size.height() + GAP_MM;
    }

    Size::new(
        width + 2.0 * LEGEND_PADDING_MM,
        height - GAP_MM + 2.0 * LEGEND_PADDING_MM,
    )
}

/// Chooses where a legend of the measured size goes. Small legends float over the map, tall and
/// narrow ones get a column next to it, the rest go to their own page.
pub fn choose_legend_layout(legend: Size, content: &Rect) -> LegendLayout {
    if legend.is_zero() {
        return LegendLayout::None;
    }

    if legend.width() <= content.width() * FLOAT_MAX_WIDTH
        && legend.height() <= content.height() * FLOAT_MAX_HEIGHT
    {
        LegendLayout::FloatedLeft
    } else if legend.width() <= content.width() * INLINE_MAX_WIDTH
        && legend.height() <= content.height()
    {
        LegendLayout::InlineLeft
    } else {
        LegendLayout::SeparatePage
    }
}

/// Frames of the page parts in millimetres from the top-left corner of the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    /// Page size.
    pub page: Size,
    /// Title, subtitle and date.
    pub title_box: Rect,
    /// Logo inside the title box.
    pub logo: Rect,
    /// Map image.
    pub map_frame: Rect,
    /// Legend, if it is on the map page.
    pub legend_frame: Option<Rect>,
    /// Center coordinates.
    pub coordinates_box: Rect,
    /// Attributions.
    pub attribution_box: Rect,
    /// Chosen legend placement.
    pub legend_layout: LegendLayout,
}

impl PageLayout {
    /// Lays out the page for a legend of the measured size.
    pub fn new(page: Size, legend: Size) -> Self {
        let left = MARGIN_MM;
        let right = page.width() - MARGIN_MM;
        let top = MARGIN_MM;
        let bottom = page.height() - MARGIN_MM;

        let title_box = Rect::new(left, top, right, top + TITLE_BOX_HEIGHT_MM);
        let logo = Rect::new(
            right - LOGO_SIZE_MM - GAP_MM,
            top + GAP_MM,
            right - GAP_MM,
            top + GAP_MM + LOGO_SIZE_MM,
        );
        let footer_top = bottom - FOOTER_HEIGHT_MM;
        let content = Rect::new(left, title_box.y_max + GAP_MM, right, footer_top - GAP_MM);

        let legend_layout = choose_legend_layout(legend, &content);
        let (map_frame, legend_frame) = match legend_layout {
            LegendLayout::InlineLeft => {
                let legend_right = left + legend.width();
                (
                    Rect::new(legend_right + GAP_MM, content.y_min, right, content.y_max),
                    Some(Rect::new(left, content.y_min, legend_right, content.y_max)),
                )
            }
            LegendLayout::FloatedLeft => (
                content,
                Some(Rect::new(
                    left + GAP_MM,
                    content.y_min + GAP_MM,
                    left + GAP_MM + legend.width(),
                    content.y_min + GAP_MM + legend.height(),
                )),
            ),
            LegendLayout::None | LegendLayout::SeparatePage => (content, None),
        };

        let middle = left + (right - left) / 3.0;
        Self {
            page,
            title_box,
            logo,
            map_frame,
            legend_frame,
            coordinates_box: Rect::new(left, footer_top, middle, bottom),
            attribution_box: Rect::new(middle + GAP_MM, footer_top, right, bottom),
            legend_layout,
        }
    }

    /// Pixel size of the map image at the resolution.
    pub fn map_size_px(&self, dpi: u32) -> Size {
        let to_px = |mm: f64| (mm / MM_PER_INCH * dpi as f64).round();
        Size::new(to_px(self.map_frame.width()), to_px(self.map_frame.height()))
    }
}

/// Text of a page box.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    /// Text.
    pub text: String,
    /// Font size in points.
    pub font_size: f64,
    /// Bold font.
    pub bold: bool,
}

impl TextLine {
    fn new(text: impl Into<String>, font_size: f64, bold: bool) -> Self {
        Self {
            text: text.into(),
            font_size,
            bold,
        }
    }
}

/// Target of the page composition. Frames are in millimetres from the top-left corner of the
/// current page.
pub trait PdfSink: MaybeSend {
    /// Starts a new page.
    fn add_page(&mut self, size: Size);

    /// Draws an image scaled into the frame.
    fn draw_image(&mut self, data: &[u8], frame: Rect) -> Result<(), GifwError>;

    /// Draws text lines into the frame, optionally over a white background.
    fn draw_text(&mut self, lines: &[TextLine], frame: Rect, background: bool);

    /// Finishes the document.
    fn finish(&mut self) -> Result<Bytes, GifwError>;
}

/// Renders the map into an image.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait MapRenderer: MaybeSend + MaybeSync {
    /// Renders the current view of the map with all visible layers.
    async fn render(&self, map: &Map) -> Result<Bytes, GifwError>;
}

/// Holds a map with a temporary view and restores the saved view when dropped.
#[derive(Debug)]
pub struct ViewRestoreGuard<'a> {
    map: &'a mut Map,
    saved: MapView,
}

impl<'a> ViewRestoreGuard<'a> {
    /// Stops any animation and saves the current view.
    pub fn new(map: &'a mut Map) -> Self {
        map.stop_animation();
        let saved = map.view().clone();
        Self { map, saved }
    }

    /// View restored on drop.
    pub fn saved_view(&self) -> &MapView {
        &self.saved
    }
}

impl Deref for ViewRestoreGuard<'_> {
    type Target = Map;

    fn deref(&self) -> &Self::Target {
        self.map
    }
}

impl DerefMut for ViewRestoreGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.map
    }
}

impl Drop for ViewRestoreGuard<'_> {
    fn drop(&mut self) {
        self.map.set_view(std::mem::take(&mut self.saved));
        debug!("Restored the map view after printing");
    }
}

/// Printed document.
#[derive(Debug, Clone, PartialEq)]
pub struct PrintOutput {
    /// Suggested file name.
    pub file_name: String,
    /// PDF data.
    pub pdf: Bytes,
    /// Where the legend went.
    pub legend_layout: LegendLayout,
    /// Number of legends that could not be loaded.
    pub missing_legends: usize,
}

/// Print ready to run.
///
/// The print is aborted through [`PrintTask::abort_handle`] and gives up after
/// [`PRINT_TIMEOUT`].
#[derive(Debug)]
pub struct PrintTask {
    request: PrintRequest,
    config: PrintConfiguration,
    legends: Vec<LegendUrl>,
    handle: AbortHandle,
    registration: AbortRegistration,
    timeout: Duration,
}

/// Services used while printing.
pub struct PrintContext<'a> {
    /// Network access for legends and the logo.
    pub http: &'a dyn HttpService,
    /// Map image renderer.
    pub renderer: &'a dyn MapRenderer,
    /// Document target.
    pub sink: &'a mut dyn PdfSink,
}

impl PrintTask {
    /// Validates the request and prepares the print of the legends.
    pub fn new(
        request: PrintRequest,
        config: PrintConfiguration,
        legends: Vec<LegendUrl>,
    ) -> Result<Self, GifwError> {
        request.validate()?;
        let (handle, registration) = AbortHandle::new_pair();
        Ok(Self {
            request,
            config,
            legends,
            handle,
            registration,
            timeout: PRINT_TIMEOUT,
        })
    }

    /// Handle cancelling the print.
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.clone()
    }

    /// Sets the time after which the print is given up.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Prints the map of the session. The view of the map is restored when the print finishes,
    /// fails, is aborted or times out.
    pub async fn run(
        self,
        session: &mut Session,
        ctx: PrintContext<'_>,
    ) -> Result<PrintOutput, GifwError> {
        let Self {
            request,
            config,
            legends,
            registration,
            timeout,
            ..
        } = self;

        let attribution = attribution_text(session.map(), config.attribution.as_deref());
        let compose = compose(&request, &config, &legends, &attribution, session.map_mut(), ctx);
        let output = with_deadline(compose, registration, timeout).await;
        match &output {
            Ok(output) => info!("Printed {}", output.file_name),
            Err(err) => warn!("Print failed: {err}"),
        }

        output
    }
}

fn attribution_text(map: &Map, extra: Option<&str>) -> String {
    let mut texts: Vec<&str> = vec![];
    for (layer, visible) in map.layers() {
        if let Some(attribution) = layer.attribution().filter(|_| visible) {
            if !texts.contains(&attribution.text.as_str()) {
                texts.push(&attribution.text);
            }
        }
    }
    texts.extend(extra);
    texts.join(", ")
}

async fn fetch_image(
    http: &dyn HttpService,
    url: &str,
    headers: Vec<(String, String)>,
) -> Result<Bytes, GifwError> {
    Ok(send_checked(http, HttpRequest::get(url).with_headers(headers))
        .await?
        .body)
}

/// Loads every legend, skipping the ones that fail.
async fn fetch_legends(
    http: &dyn HttpService,
    legends: &[LegendUrl],
) -> (Vec<LegendImage>, usize) {
    let results = join_all(
        legends
            .iter()
            .map(|legend| fetch_image(http, &legend.url, legend.headers.clone())),
    )
    .await;

    let mut images = vec![];
    let mut missing = 0;
    for (legend, result) in legends.iter().zip(results) {
        match result {
            Ok(data) => images.push(LegendImage::new(&legend.layer_name, data)),
            Err(err) => {
                warn!("Legend of {} is not available: {err}", legend.layer_id);
                missing += 1;
            }
        }
    }

    (images, missing)
}

fn draw_legend(
    sink: &mut dyn PdfSink,
    images: &[LegendImage],
    frame: Rect,
    background: bool,
) -> Result<(), GifwError> {
    if background {
        sink.draw_text(&[], frame, true);
    }

    let mut top = frame.y_min + LEGEND_PADDING_MM;
    let left = frame.x_min + LEGEND_PADDING_MM;
    for image in images {
        sink.draw_text(
            &[TextLine::new(&image.layer_name, LEGEND_FONT_SIZE_PT, true)],
            Rect::new(left, top, frame.x_max - LEGEND_PADDING_MM, top + LEGEND_TITLE_HEIGHT_MM),
            false,
        );
        top += LEGEND_TITLE_HEIGHT_MM;

        let size = image.size_mm();
        sink.draw_image(
            &image.data,
            Rect::new(left, top, left + size.width(), top + size.height()),
        )?;
        top += size.height() + GAP_MM;
    }

    Ok(())
}

/// Legends on their own page, flowing into columns.
fn draw_legend_page(
    sink: &mut dyn PdfSink,
    images: &[LegendImage],
    page: Size,
) -> Result<(), GifwError> {
    sink.add_page(page);
    let bottom = page.height() - MARGIN_MM;
    let mut column = Rect::new(MARGIN_MM, MARGIN_MM, MARGIN_MM, bottom);
    let mut start = 0;

    while start < images.len() {
        let mut end = start + 1;
        while end < images.len() && measure_legend(&images[start..=end]).height() <= column.height() {
            end += 1;
        }

        let chunk = &images[start..end];
        let size = measure_legend(chunk);
        let frame = Rect::new(column.x_max, column.y_min, column.x_max + size.width(), bottom);
        draw_legend(sink, chunk, frame, false)?;
        column = Rect::new(frame.x_max + GAP_MM, column.y_min, frame.x_max + GAP_MM, bottom);
        start = end;
    }

    Ok(())
}

async fn compose(
    request: &PrintRequest,
    config: &PrintConfiguration,
    legends: &[LegendUrl],
    attribution: &str,
    map: &mut Map,
    ctx: PrintContext<'_>,
) -> Result<PrintOutput, GifwError> {
    let PrintContext { http, renderer, sink } = ctx;

    let (images, missing_legends) = if request.include_legend {
        fetch_legends(http, legends).await
    } else {
        (vec![], 0)
    };

    let page = request.paper.page_size(request.orientation);
    let layout = PageLayout::new(page, measure_legend(&images));
    debug!("Printing with legend layout {:?}", layout.legend_layout);

    let (map_image, center) = {
        let mut map = ViewRestoreGuard::new(map);
        let saved = map.saved_view().clone();
        let size = layout.map_size_px(request.dpi);
        let old = saved.size();
        let scale = if old.is_zero() || size.is_zero() {
            1.0
        } else {
            (old.width() / size.width()).max(old.height() / size.height())
        };
        map.set_view(
            saved
                .with_size(size)
                .with_resolution(saved.resolution() * scale),
        );

        let image = renderer.render(&map).await?;
        (image, saved.center())
    };

    sink.add_page(page);
    sink.draw_image(&map_image, layout.map_frame)?;

    let mut title = vec![TextLine::new(&request.title, 16.0, true)];
    if let Some(subtitle) = request.subtitle.as_deref().filter(|s| !s.trim().is_empty()) {
        title.push(TextLine::new(subtitle, 11.0, false));
    }
    title.push(TextLine::new(request.date.format("%d %B %Y").to_string(), 9.0, false));
    sink.draw_text(&title, layout.title_box, true);

    if let Some(logo_url) = &config.logo_url {
        match fetch_image(http, logo_url, vec![]).await {
            Ok(logo) => sink.draw_image(&logo, layout.logo)?,
            Err(err) => warn!("Logo is not available: {err}"),
        }
    }

    let map_crs = map.view().crs().clone();
    let center = map_crs.transform_point(&request.coordinate_crs, &center)?;
    let decimals = request.coordinate_decimals;
    sink.draw_text(
        &[TextLine::new(
            format!(
                "Centre: {:.decimals$}, {:.decimals$} ({})",
                center.x,
                center.y,
                request.coordinate_crs.code()
            ),
            8.0,
            false,
        )],
        layout.coordinates_box,
        true,
    );
    if !attribution.is_empty() {
        sink.draw_text(
            &[TextLine::new(attribution, 7.0, false)],
            layout.attribution_box,
            true,
        );
    }

    match (layout.legend_layout, layout.legend_frame) {
        (LegendLayout::InlineLeft, Some(frame)) => draw_legend(sink, &images, frame, false)?,
        (LegendLayout::FloatedLeft, Some(frame)) => draw_legend(sink, &images, frame, true)?,
        (LegendLayout::SeparatePage, _) => draw_legend_page(sink, &images, page)?,
        _ => {}
    }

    Ok(PrintOutput {
        file_name: format!("{}.pdf", sanitize_file_name(&request.title)),
        pdf: sink.finish()?,
        legend_layout: layout.legend_layout,
        missing_legends,
    })
}

fn sanitize_file_name(title: &str) -> String {
    let name: String = title
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "map".into()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use assert_matches::assert_matches;
    use gifw_types::cartesian::Point2d;
    use parking_lot::Mutex;

    use super::*;
    use crate::platform::testing::ScriptedHttp;

    fn a4() -> PaperSize {
        PaperSize {
            name: "A4".into(),
            width_mm: 210.0,
            height_mm: 297.0,
        }
    }

    fn legend(name: &str, width: f64, height: f64) -> LegendImage {
        LegendImage {
            layer_name: name.into(),
            data: Bytes::new(),
            size: Size::new(width, height),
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        pages: usize,
        images: Vec<Rect>,
        texts: Vec<String>,
    }

    impl PdfSink for RecordingSink {
        fn add_page(&mut self, _size: Size) {
            self.pages += 1;
        }

        fn draw_image(&mut self, _data: &[u8], frame: Rect) -> Result<(), GifwError> {
            self.images.push(frame);
            Ok(())
        }

        fn draw_text(&mut self, lines: &[TextLine], _frame: Rect, _background: bool) {
            self.texts.extend(lines.iter().map(|l| l.text.clone()));
        }

        fn finish(&mut self) -> Result<Bytes, GifwError> {
            Ok(Bytes::from_static(b"%PDF-1.7"))
        }
    }

    /// Records the view it renders. Aborts the print instead of rendering if given a handle.
    #[derive(Default)]
    struct TestRenderer {
        rendered: Mutex<Vec<MapView>>,
        abort: Option<AbortHandle>,
    }

    #[async_trait]
    impl MapRenderer for TestRenderer {
        async fn render(&self, map: &Map) -> Result<Bytes, GifwError> {
            self.rendered.lock().push(map.view().clone());
            if let Some(handle) = &self.abort {
                handle.abort();
                futures::future::pending::<()>().await;
            }
            Ok(Bytes::from_static(b"map"))
        }
    }

    fn session() -> Session {
        let mut session = Session::default();
        session.map_mut().set_view(
            MapView::new(Point2d::new(1000.0, 2000.0), 10.0, Crs::EPSG3857)
                .with_size(Size::new(800.0, 600.0)),
        );
        session
    }

    fn config() -> PrintConfiguration {
        PrintConfiguration {
            paper_sizes: vec![a4()],
            resolutions: default_resolutions(),
            default_title: None,
            logo_url: None,
            attribution: Some("Contains OS data".into()),
        }
    }

    fn encoded(width: u32, height: u32, format: image::ImageOutputFormat) -> Bytes {
        let mut data = Cursor::new(vec![]);
        image::RgbaImage::from_pixel(width, height, image::Rgba([40, 90, 200, 255]))
            .write_to(&mut data, format)
            .unwrap();
        Bytes::from(data.into_inner())
    }

    #[test]
    fn legend_size_is_read_from_png_and_gif() {
        let png = LegendImage::new("Roads", encoded(120, 45, image::ImageOutputFormat::Png));
        assert_eq!(png.size, Size::new(120.0, 45.0));

        let gif = LegendImage::new("Stops", encoded(120, 300, image::ImageOutputFormat::Gif));
        assert_eq!(gif.size, Size::new(120.0, 300.0));

        let broken = LegendImage::new("Parks", Bytes::from_static(b"<ServiceException/>"));
        assert_eq!(broken.size, DEFAULT_LEGEND_IMAGE);
        assert_matches!(image_size(b"GIF89a"), Err(GifwError::Decoding(_)));
    }

    #[test]
    fn tall_gif_legend_does_not_float() {
        let content = Rect::new(10.0, 30.0, 287.0, 182.0);
        let gif = LegendImage::new("Stops", encoded(120, 300, image::ImageOutputFormat::Gif));
        assert_eq!(
            choose_legend_layout(measure_legend(&[gif]), &content),
            LegendLayout::InlineLeft
        );
        assert_eq!(
            choose_legend_layout(measure_legend(&[legend("Stops", 20.0, 20.0)]), &content),
            LegendLayout::FloatedLeft
        );
    }

    #[test]
    fn legend_layout_by_size() {
        let content = Rect::new(10.0, 30.0, 287.0, 182.0);
        assert_eq!(choose_legend_layout(Size::new(0.0, 0.0), &content), LegendLayout::None);

        let small = measure_legend(&[legend("Roads", 20.0, 20.0)]);
        assert_eq!(choose_legend_layout(small, &content), LegendLayout::FloatedLeft);

        let tall: Vec<_> = (0..5).map(|i| legend(&format!("Layer {i}"), 60.0, 60.0)).collect();
        assert_eq!(
            choose_legend_layout(measure_legend(&tall), &content),
            LegendLayout::InlineLeft
        );

        let huge: Vec<_> = (0..30).map(|i| legend(&format!("Layer {i}"), 60.0, 60.0)).collect();
        assert_eq!(
            choose_legend_layout(measure_legend(&huge), &content),
            LegendLayout::SeparatePage
        );
    }

    #[test]
    fn inline_legend_narrows_map() {
        let tall: Vec<_> = (0..5).map(|i| legend(&format!("Layer {i}"), 60.0, 60.0)).collect();
        let legend_size = measure_legend(&tall);
        let layout = PageLayout::new(a4().page_size(Orientation::Landscape), legend_size);

        assert_eq!(layout.legend_layout, LegendLayout::InlineLeft);
        let frame = layout.legend_frame.unwrap();
        assert_relative_eq!(frame.width(), legend_size.width());
        assert!(layout.map_frame.x_min > frame.x_max);
    }

    #[tokio::test]
    async fn print_composes_page_and_restores_view() {
        let mut session = session();
        let before = session.map().view().clone();
        let http = ScriptedHttp::default();
        let renderer = TestRenderer::default();
        let mut sink = RecordingSink::default();

        let request = PrintRequest::new("Flood risk", a4())
            .with_subtitle("Draft")
            .with_dpi(300)
            .with_coordinates(Crs::EPSG3857, 0);
        let task = PrintTask::new(request, config(), vec![]).unwrap();
        let output = task
            .run(
                &mut session,
                PrintContext {
                    http: &http,
                    renderer: &renderer,
                    sink: &mut sink,
                },
            )
            .await
            .unwrap();

        assert_eq!(output.file_name, "Flood_risk.pdf");
        assert_eq!(output.legend_layout, LegendLayout::None);
        assert_eq!(sink.pages, 1);
        assert!(sink.texts.contains(&"Centre: 1000, 2000 (EPSG:3857)".to_string()));
        assert!(sink.texts.contains(&"Contains OS data".to_string()));

        let rendered = renderer.rendered.lock()[0].clone();
        assert!(rendered.size().width() > 800.0);
        assert_eq!(rendered.center(), before.center());
        assert_eq!(session.map().view(), &before);
    }

    #[tokio::test]
    async fn aborted_print_restores_view() {
        let mut session = session();
        let before = session.map().view().clone();
        let http = ScriptedHttp::default();
        let mut sink = RecordingSink::default();

        let task = PrintTask::new(PrintRequest::new("Map", a4()), config(), vec![]).unwrap();
        let renderer = TestRenderer {
            rendered: Mutex::default(),
            abort: Some(task.abort_handle()),
        };

        let result = task
            .run(
                &mut session,
                PrintContext {
                    http: &http,
                    renderer: &renderer,
                    sink: &mut sink,
                },
            )
            .await;

        assert_matches!(result, Err(GifwError::Aborted));
        assert_eq!(renderer.rendered.lock().len(), 1);
        assert_ne!(renderer.rendered.lock()[0], before);
        assert_eq!(session.map().view(), &before);
        assert_eq!(sink.pages, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn print_times_out() {
        struct Stalled;

        #[async_trait]
        impl MapRenderer for Stalled {
            async fn render(&self, _map: &Map) -> Result<Bytes, GifwError> {
                futures::future::pending().await
            }
        }

        let mut session = session();
        let before = session.map().view().clone();
        let http = ScriptedHttp::default();
        let mut sink = RecordingSink::default();
        let task = PrintTask::new(PrintRequest::new("Map", a4()), config(), vec![]).unwrap();

        let result = task
            .run(
                &mut session,
                PrintContext {
                    http: &http,
                    renderer: &Stalled,
                    sink: &mut sink,
                },
            )
            .await;
        assert_matches!(result, Err(GifwError::Timeout));
        assert_eq!(session.map().view(), &before);
    }

    #[test]
    fn missing_legends_are_counted() {
        let http = ScriptedHttp::default().with_route("roads", 200, "png");
        let legends = vec![
            LegendUrl {
                layer_id: "roads".into(),
                layer_name: "Roads".into(),
                url: "https://maps.example.com/wms?LAYER=roads".into(),
                headers: vec![],
            },
            LegendUrl {
                layer_id: "rivers".into(),
                layer_name: "Rivers".into(),
                url: "https://maps.example.com/wms?LAYER=rivers".into(),
                headers: vec![],
            },
        ];

        let (images, missing) = tokio_test::block_on(fetch_legends(&http, &legends));
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].size, DEFAULT_LEGEND_IMAGE);
        assert_eq!(missing, 1);
    }

    #[test]
    fn request_is_validated() {
        let request = PrintRequest::new(" ", a4()).with_dpi(1200);
        assert_matches!(
            PrintTask::new(request, config(), vec![]),
            Err(GifwError::Validation(issues)) if issues.len() == 2
        );
    }
}
