mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::AbortHandle;
use gifw::alert::AlertKind;
use gifw::export::print::TextLine;
use gifw::export::{MapRenderer, PdfSink, PrintContext, PrintRequest};
use gifw::gifw_types::cartesian::{Rect, Size};
use gifw::{GifwError, Map, MapView};
use parking_lot::Mutex;

use common::{engine, FakeHttp};

const PRINT_CONFIG: &str = r#"{
    "paperSizes": [{"name": "A4", "widthMm": 210.0, "heightMm": 297.0},
                   {"name": "A3", "widthMm": 297.0, "heightMm": 420.0}],
    "attribution": "Contains OS data"
}"#;

#[derive(Default)]
struct CountingSink {
    pages: usize,
}

impl PdfSink for CountingSink {
    fn add_page(&mut self, _size: Size) {
        self.pages += 1;
    }

    fn draw_image(&mut self, _data: &[u8], _frame: Rect) -> Result<(), GifwError> {
        Ok(())
    }

    fn draw_text(&mut self, _lines: &[TextLine], _frame: Rect, _background: bool) {}

    fn finish(&mut self) -> Result<Bytes, GifwError> {
        Ok(Bytes::from_static(b"%PDF-1.7"))
    }
}

enum Behaviour {
    Render,
    Abort(AbortHandle),
    Hang,
}

struct Renderer {
    behaviour: Mutex<Option<Behaviour>>,
    views: Mutex<Vec<MapView>>,
}

impl Renderer {
    fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour: Mutex::new(Some(behaviour)),
            views: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl MapRenderer for Renderer {
    async fn render(&self, map: &Map) -> Result<Bytes, GifwError> {
        self.views.lock().push(map.view().clone());
        let behaviour = self.behaviour.lock().take();
        match behaviour {
            Some(Behaviour::Abort(handle)) => {
                handle.abort();
                futures::future::pending::<()>().await;
            }
            Some(Behaviour::Hang) => tokio::time::sleep(Duration::from_secs(120)).await,
            Some(Behaviour::Render) | None => {}
        }
        Ok(Bytes::from_static(b"map"))
    }
}

fn http() -> FakeHttp {
    FakeHttp::default().route("/api/print/cornwall", 200, PRINT_CONFIG)
}

#[tokio::test]
async fn print_renders_at_print_size() {
    let (mut engine, _) = engine();
    let http = http();
    let config = engine.fetch_print_configuration(&http).await.unwrap();
    let paper = config.paper("a3").unwrap().clone();
    let task = engine
        .prepare_print(PrintRequest::new("Heritage sites", paper), config)
        .unwrap();

    let before = engine.map().view().clone();
    let renderer = Renderer::new(Behaviour::Render);
    let mut sink = CountingSink::default();
    let output = engine
        .print(
            task,
            PrintContext {
                http: &http,
                renderer: &renderer,
                sink: &mut sink,
            },
        )
        .await
        .unwrap();

    assert_eq!(output.file_name, "Heritage_sites.pdf");
    assert_eq!(output.missing_legends, 1);
    assert!(sink.pages >= 1);
    assert_ne!(renderer.views.lock()[0].size(), before.size());
    assert_eq!(engine.map().view(), &before);
    assert!(engine.session().alerts().next().is_none());
}

#[tokio::test]
async fn aborted_print_restores_the_view_quietly() {
    let (mut engine, _) = engine();
    let http = http();
    let config = engine.fetch_print_configuration(&http).await.unwrap();
    let paper = config.paper("A4").unwrap().clone();
    let task = engine
        .prepare_print(PrintRequest::new("Heritage sites", paper), config)
        .unwrap();

    let before = engine.map().view().clone();
    let renderer = Renderer::new(Behaviour::Abort(task.abort_handle()));
    let mut sink = CountingSink::default();
    let result = engine
        .print(
            task,
            PrintContext {
                http: &http,
                renderer: &renderer,
                sink: &mut sink,
            },
        )
        .await;

    assert_matches!(result, Err(GifwError::Aborted));
    assert_eq!(engine.map().view(), &before);
    assert!(engine.session().alerts().next().is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_print_times_out() {
    let (mut engine, _) = engine();
    let http = http();
    let config = engine.fetch_print_configuration(&http).await.unwrap();
    let paper = config.paper("A4").unwrap().clone();
    let task = engine
        .prepare_print(PrintRequest::new("Heritage sites", paper), config)
        .unwrap();

    let before = engine.map().view().clone();
    let renderer = Renderer::new(Behaviour::Hang);
    let mut sink = CountingSink::default();
    let result = engine
        .print(
            task,
            PrintContext {
                http: &http,
                renderer: &renderer,
                sink: &mut sink,
            },
        )
        .await;

    assert_matches!(result, Err(GifwError::Timeout));
    assert_eq!(engine.map().view(), &before);
    let alerts = engine.session_mut().take_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Popup);
}

#[tokio::test]
async fn print_configuration_failure_is_reported() {
    let (mut engine, _) = engine();
    let http = FakeHttp::default().route("/api/print/cornwall", 500, "");
    assert!(engine.fetch_print_configuration(&http).await.is_err());
    let alerts = engine.session_mut().take_alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Blocking);
}
