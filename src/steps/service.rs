//! Step description pipeline.
//!
//! Received → Decoded → ReferenceSelected → Transformed → Annotated →
//! Resized → ModelInvoked → Normalized → Cached. Any failure ends the
//! request with the error; the HTTP layer renders it as `result: false`.
//! A cache hit skips everything after the lookup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine as _;
use tokio::sync::Mutex;

use crate::config::AnnotationConfig;
use crate::errors::{ScribeError, ScribeResult};
use crate::llm::normalize::normalize_with_default;
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, CompletionRequest};
use crate::perception::annotator::{self, Highlight};
use crate::perception::reference::{reference_scale, ReferenceChoice};
use crate::perception::transform;
use crate::perception::types::PixelRect;
use crate::steps::cache::{StepCache, StepRecord};
use crate::steps::payload::{decode_image, ElementGraph, StepPayload};

/// Name given to a step whose completion is plain text.
pub const STEP_DEFAULT_NAME: &str = "UI Step";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Decoded,
    ReferenceSelected,
    Transformed,
    Annotated,
    Resized,
    ModelInvoked,
    Normalized,
    Cached,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub element_id: String,
    pub name: String,
    pub description: String,
    pub cached: bool,
    pub counter: u64,
}

impl StepOutcome {
    fn from_record(record: StepRecord, cached: bool) -> Self {
        Self {
            element_id: record.element_id,
            name: record.name,
            description: record.description,
            cached,
            counter: record.counter,
        }
    }
}

/// Screenshot ready for the backend.
struct PreparedImage {
    png_base64: String,
    highlight: PixelRect,
}

/// Where the clicked element lands in an image of `width` × `height` pixels.
pub fn highlight_rect(graph: &ElementGraph, width: u32, height: u32) -> (PixelRect, ReferenceChoice) {
    let (scale, choice) = reference_scale(graph.rects(), width, height);
    (transform::project(&graph.clicked_rect(), scale), choice)
}

pub struct DescriptionService {
    backend: Arc<dyn LlmProvider>,
    call: CallConfig,
    cache: Arc<dyn StepCache>,
    annotation: AnnotationConfig,
    prompt: String,
    /// Per-element locks so concurrent requests for one element share a single backend call.
    in_flight: InFlight,
}

type InFlight = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// Claim on an element's lock. Dropping it removes the map entry once no
/// other request holds a claim, including when the request future is cancelled.
struct InFlightSlot<'a> {
    map: &'a InFlight,
    element_id: String,
    lock: Arc<Mutex<()>>,
}

impl<'a> InFlightSlot<'a> {
    fn claim(map: &'a InFlight, element_id: &str) -> Self {
        let mut entries = map.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let lock = entries.entry(element_id.to_string()).or_default().clone();
        Self {
            map,
            element_id: element_id.to_string(),
            lock,
        }
    }
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        let mut entries = self.map.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map, one here: nobody else is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            entries.remove(&self.element_id);
        }
    }
}

impl DescriptionService {
    pub fn new(
        backend: Arc<dyn LlmProvider>,
        call: CallConfig,
        cache: Arc<dyn StepCache>,
        annotation: AnnotationConfig,
        prompt: String,
    ) -> Self {
        Self {
            backend,
            call,
            cache,
            annotation,
            prompt,
            in_flight: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Read path: the stored record for `element_id`, counting the access.
    pub async fn cached(&self, element_id: &str) -> ScribeResult<Option<StepRecord>> {
        self.cache.lookup(element_id).await
    }

    pub async fn describe(&self, payload: &StepPayload) -> ScribeResult<StepOutcome> {
        let graph = ElementGraph::from_payload(payload)?;
        let image = payload.image()?;
        let element_id = graph.clicked_id().to_string();

        let slot = InFlightSlot::claim(&self.in_flight, &element_id);
        let _held = slot.lock.lock().await;
        self.describe_locked(&graph, image, &element_id).await
    }

    async fn describe_locked(&self, graph: &ElementGraph, image: &str, element_id: &str) -> ScribeResult<StepOutcome> {
        if let Some(hit) = self.cache.lookup(element_id).await? {
            tracing::info!(element_id, counter = hit.counter, "step served from cache");
            return Ok(StepOutcome::from_record(hit, true));
        }

        let mut stage = Stage::Received;
        let result = self.run_pipeline(graph, image, element_id, &mut stage).await;
        if let Err(e) = &result {
            tracing::warn!(element_id, stage = ?stage, error = %e, "step description failed");
        }
        result
    }

    async fn run_pipeline(
        &self,
        graph: &ElementGraph,
        image: &str,
        element_id: &str,
        stage: &mut Stage,
    ) -> ScribeResult<StepOutcome> {
        let rects = graph.clone();
        let image = image.to_string();
        let style = Highlight::from(&self.annotation);
        let max_dimension = self.annotation.max_dimension;
        let dump = self.annotation.debug_dump.clone();

        // Decoding, drawing and Lanczos resampling are CPU-bound.
        let (reached, prepared) = tokio::task::spawn_blocking(move || {
            let mut local = Stage::Received;
            let prepared = prepare_image(&rects, &image, style, max_dimension, dump, &mut local);
            (local, prepared)
        })
        .await
        .map_err(|e| ScribeError::Image(format!("image task: {e}")))?;
        *stage = reached;
        let prepared = prepared?;

        tracing::info!(
            element_id,
            kb = prepared.png_base64.len() / 1024,
            x = prepared.highlight.x,
            y = prepared.highlight.y,
            "image size for backend"
        );

        let request = CompletionRequest::with_image(self.prompt.clone(), prepared.png_base64, self.call.step_max_tokens);
        let raw = self.backend.complete(&request, &self.call).await?;
        advance(stage, Stage::ModelInvoked);

        let described = normalize_with_default(&raw, STEP_DEFAULT_NAME);
        advance(stage, Stage::Normalized);

        let record = self.cache.store(element_id, &described.name, &described.description).await?;
        advance(stage, Stage::Cached);

        Ok(StepOutcome::from_record(record, false))
    }

}

fn advance(stage: &mut Stage, next: Stage) {
    tracing::debug!(from = ?*stage, to = ?next, "step stage");
    *stage = next;
}

fn prepare_image(
    graph: &ElementGraph,
    image: &str,
    style: Highlight,
    max_dimension: u32,
    dump: Option<PathBuf>,
    stage: &mut Stage,
) -> ScribeResult<PreparedImage> {
    let decoded = decode_image(image)?;
    advance(stage, Stage::Decoded);

    let (highlight, choice) = highlight_rect(graph, decoded.width(), decoded.height());
    advance(stage, Stage::ReferenceSelected);
    if choice.is_fallback() {
        tracing::warn!(
            element_id = graph.clicked_id(),
            root = graph.root_id(),
            "highlight drawn with identity scale"
        );
    }
    advance(stage, Stage::Transformed);

    let annotated = annotator::annotate(&decoded, &highlight, style);
    advance(stage, Stage::Annotated);

    if let Some(path) = dump {
        match annotated.save(&path) {
            Ok(()) => tracing::debug!(path = %path.display(), "annotated image dumped"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to dump annotated image"),
        }
    }

    let resized = annotator::resize_for_transport(annotated, max_dimension);
    let png = annotator::encode_png(&resized)?;
    advance(stage, Stage::Resized);

    Ok(PreparedImage {
        png_base64: base64::engine::general_purpose::STANDARD.encode(&png),
        highlight,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use base64::Engine as _;
    use crate::steps::cache::JsonFileStore;
    use async_trait::async_trait;
    use image::{DynamicImage, RgbaImage};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Backend double that records calls and returns a canned reply.
    pub(crate) struct FakeProvider {
        reply: ScribeResult<String>,
        delay: Duration,
        pub calls: AtomicUsize,
        pub last_request: std::sync::Mutex<Option<CompletionRequest>>,
    }

    impl FakeProvider {
        pub(crate) fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
                last_request: std::sync::Mutex::new(None),
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self {
                reply: Err(ScribeError::Backend(message.to_string())),
                ..Self::replying("")
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl LlmProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        async fn complete(&self, request: &CompletionRequest, _cfg: &CallConfig) -> ScribeResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(ScribeError::Backend(e.to_string())),
            }
        }
    }

    pub(crate) fn call_config() -> CallConfig {
        CallConfig {
            model: "fake-model".into(),
            temperature: None,
            step_max_tokens: 300,
            journey_max_tokens: 200,
        }
    }

    pub(crate) fn screenshot_uri(width: u32, height: u32) -> String {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, image::Rgba([255, 255, 255, 255])));
        let png = annotator::encode_png(&img).unwrap();
        format!("data:image/png;base64,{}", base64::engine::general_purpose::STANDARD.encode(png))
    }

    pub(crate) fn payload_json(image: &str, root: [f64; 4], clicked: [f64; 4]) -> serde_json::Value {
        let rect = |r: [f64; 4]| serde_json::json!({"x": r[0], "y": r[1], "width": r[2], "height": r[3]});
        serde_json::json!({
            "image": image,
            "elementIds": ["root", "menu-btn"],
            "attributes": {
                "root": {"metadata": {"domRect": rect(root)}},
                "menu-btn": {"metadata": {"domRect": rect(clicked)}}
            }
        })
    }

    fn service(backend: Arc<FakeProvider>, dir: &tempfile::TempDir) -> DescriptionService {
        let cache: Arc<dyn StepCache> = Arc::new(JsonFileStore::new(dir.path().join("steps.json")));
        DescriptionService::new(
            backend,
            call_config(),
            cache,
            AnnotationConfig::default(),
            "Describe the highlighted element".into(),
        )
    }

    fn payload(json: serde_json::Value) -> StepPayload {
        StepPayload::from_json(json).unwrap()
    }

    #[test]
    fn half_resolution_highlight() {
        let p = payload(payload_json("", [0.0, 0.0, 1200.0, 800.0], [600.0, 400.0, 120.0, 40.0]));
        let graph = ElementGraph::from_payload(&p).unwrap();
        let (rect, choice) = highlight_rect(&graph, 600, 400);
        assert!(!choice.is_fallback());
        assert_eq!(
            rect,
            PixelRect {
                x: 300.0,
                y: 200.0,
                width: 60.0,
                height: 20.0
            }
        );
    }

    #[test]
    fn zero_sized_root_uses_next_rect() {
        let p = payload(payload_json("", [0.0, 0.0, 0.0, 0.0], [100.0, 50.0, 200.0, 100.0]));
        let graph = ElementGraph::from_payload(&p).unwrap();
        let (rect, choice) = highlight_rect(&graph, 400, 200);
        assert!(matches!(choice, ReferenceChoice::Selected { index: 1, .. }));
        assert_eq!((rect.x, rect.y, rect.width, rect.height), (200.0, 100.0, 400.0, 200.0));
    }

    #[tokio::test]
    async fn miss_then_hit_calls_backend_once() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeProvider::replying("Click here to open the menu"));
        let svc = service(backend.clone(), &dir);
        let p = payload(payload_json(&screenshot_uri(600, 400), [0.0, 0.0, 1200.0, 800.0], [600.0, 400.0, 120.0, 40.0]));

        let first = svc.describe(&p).await.unwrap();
        assert!(!first.cached);
        assert_eq!(first.element_id, "menu-btn");
        assert_eq!(first.name, STEP_DEFAULT_NAME);
        assert_eq!(first.description, "Click here to open the menu");
        assert_eq!(first.counter, 1);

        let second = svc.describe(&p).await.unwrap();
        assert!(second.cached);
        assert_eq!(second.description, first.description);
        assert_eq!(second.counter, 2);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

        let read = svc.cached("menu-btn").await.unwrap().unwrap();
        assert_eq!(read.counter, 3);
    }

    #[tokio::test]
    async fn concurrent_requests_share_one_backend_call() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeProvider::replying("Click here to save").slow(Duration::from_millis(50)));
        let svc = Arc::new(service(backend.clone(), &dir));
        let p = payload(payload_json(&screenshot_uri(64, 64), [0.0, 0.0, 64.0, 64.0], [8.0, 8.0, 16.0, 16.0]));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let svc = svc.clone();
                let p = p.clone();
                tokio::spawn(async move { svc.describe(&p).await.unwrap() })
            })
            .collect();
        let mut cached = 0;
        for h in handles {
            if h.await.unwrap().cached {
                cached += 1;
            }
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cached, 4);
        assert!(svc.in_flight.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancelled_request_releases_element_lock() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeProvider::replying("Click here to save").slow(Duration::from_secs(5)));
        let svc = service(backend.clone(), &dir);
        let p = payload(payload_json(&screenshot_uri(32, 32), [0.0, 0.0, 32.0, 32.0], [1.0, 1.0, 5.0, 5.0]));

        let timed_out = tokio::time::timeout(Duration::from_millis(500), svc.describe(&p)).await;
        assert!(timed_out.is_err());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(svc.in_flight.lock().unwrap().is_empty());
        assert!(svc.cached("menu-btn").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn json_reply_supplies_name() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeProvider::replying(
            "```json\n{\"name\":\"Open Menu\",\"description\":\"Click here to open the menu\"}\n```",
        ));
        let svc = service(backend, &dir);
        let p = payload(payload_json(&screenshot_uri(32, 32), [0.0, 0.0, 32.0, 32.0], [1.0, 1.0, 5.0, 5.0]));
        let out = svc.describe(&p).await.unwrap();
        assert_eq!(out.name, "Open Menu");
        assert_eq!(out.description, "Click here to open the menu");
    }

    #[tokio::test]
    async fn backend_image_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeProvider::replying("Click here to continue"));
        let svc = service(backend.clone(), &dir);
        let p = payload(payload_json(&screenshot_uri(2000, 1000), [0.0, 0.0, 1000.0, 500.0], [10.0, 10.0, 50.0, 20.0]));
        svc.describe(&p).await.unwrap();

        let request = backend.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.max_tokens, 300);
        let png = base64::engine::general_purpose::STANDARD
            .decode(request.image_png_base64.unwrap())
            .unwrap();
        let sent = image::load_from_memory(&png).unwrap();
        assert_eq!((sent.width(), sent.height()), (1024, 512));
    }

    #[tokio::test]
    async fn degenerate_references_still_describe() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeProvider::replying("Click here to close the dialog"));
        let svc = service(backend, &dir);
        let p = payload(payload_json(&screenshot_uri(100, 100), [0.0, 0.0, 0.0, 0.0], [10.0, 10.0, 0.0, 0.0]));
        let out = svc.describe(&p).await.unwrap();
        assert_eq!(out.description, "Click here to close the dialog");
    }

    #[tokio::test]
    async fn backend_failure_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeProvider::failing("503 Service Unavailable"));
        let svc = service(backend.clone(), &dir);
        let p = payload(payload_json(&screenshot_uri(32, 32), [0.0, 0.0, 32.0, 32.0], [1.0, 1.0, 5.0, 5.0]));

        assert!(matches!(svc.describe(&p).await, Err(ScribeError::Backend(_))));
        assert!(svc.cached("menu-btn").await.unwrap().is_none());
        assert!(matches!(svc.describe(&p).await, Err(ScribeError::Backend(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn undecodable_image_fails_before_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(FakeProvider::replying("unused"));
        let svc = service(backend.clone(), &dir);
        let p = payload(payload_json("data:image/png;base64,aGVsbG8=", [0.0, 0.0, 32.0, 32.0], [1.0, 1.0, 5.0, 5.0]));

        assert!(matches!(svc.describe(&p).await, Err(ScribeError::Decode(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_fields_are_input_errors() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(Arc::new(FakeProvider::replying("unused")), &dir);

        let no_ids = payload(serde_json::json!({"image": screenshot_uri(8, 8)}));
        assert!(matches!(svc.describe(&no_ids).await, Err(ScribeError::InputValidation(_))));

        let mut no_image = payload_json("", [0.0, 0.0, 8.0, 8.0], [1.0, 1.0, 2.0, 2.0]);
        no_image.as_object_mut().unwrap().remove("image");
        assert!(matches!(
            svc.describe(&payload(no_image)).await,
            Err(ScribeError::InputValidation(_))
        ));
    }
}
