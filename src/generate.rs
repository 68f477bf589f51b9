use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{StudioError, StudioResult};
use crate::session::UploadedImage;

/// Upper bound on one generation call; the backend takes seconds, not
/// minutes, and there is no streaming to keep alive.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// The generation service, reduced to its interface boundary: one
/// reference image, optionally a second style reference, and a text
/// instruction in; zero or one image out. Calls block for seconds and are
/// never retried automatically.
pub trait GenerationBackend: Send + Sync {
    fn generate(
        &self,
        image: &UploadedImage,
        style: Option<&UploadedImage>,
        prompt: &str,
    ) -> StudioResult<UploadedImage>;
}

/// Outcome for one slot of a variation batch.
pub struct SlotOutcome {
    pub slot: usize,
    pub result: StudioResult<UploadedImage>,
}

/// Issues `count` generation requests in parallel, one thread each, and
/// reports every slot's outcome on the returned channel as it settles.
///
/// This is a wait-for-all, report-each join: a slow or failed request
/// never blocks a sibling from filling its own slot. `notify` is invoked
/// after each send so the UI can wake up (the egui repaint handle).
pub fn spawn_batch(
    backend: Arc<dyn GenerationBackend>,
    image: Arc<UploadedImage>,
    style: Option<Arc<UploadedImage>>,
    prompt: String,
    count: usize,
    notify: impl Fn() + Send + Clone + 'static,
) -> mpsc::Receiver<SlotOutcome> {
    let (tx, rx) = mpsc::channel();
    for slot in 0..count {
        let backend = Arc::clone(&backend);
        let image = Arc::clone(&image);
        let style = style.clone();
        let prompt = prompt.clone();
        let tx = tx.clone();
        let notify = notify.clone();
        std::thread::spawn(move || {
            let result = backend.generate(&image, style.as_deref(), &prompt);
            if let Err(ref err) = result {
                warn!(slot, %err, "generation request failed");
            }
            let _ = tx.send(SlotOutcome { slot, result });
            notify();
        });
    }
    rx
}

#[derive(Serialize)]
struct InlinePayload<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    image: InlinePayload<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    style_image: Option<InlinePayload<'a>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    image: Option<InlineResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct InlineResult {
    data: String,
}

/// Blocking HTTP client for the hosted generation endpoint. Images travel
/// as base64 inline payloads in a JSON body.
pub struct HttpBackend {
    endpoint: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl HttpBackend {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> StudioResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| StudioError::backend(err.to_string()))?;
        Ok(Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            client,
        })
    }
}

impl GenerationBackend for HttpBackend {
    fn generate(
        &self,
        image: &UploadedImage,
        style: Option<&UploadedImage>,
        prompt: &str,
    ) -> StudioResult<UploadedImage> {
        let body = GenerateRequest {
            prompt,
            image: InlinePayload {
                mime_type: image.mime(),
                data: image.base64_payload(),
            },
            style_image: style.map(|s| InlinePayload {
                mime_type: s.mime(),
                data: s.base64_payload(),
            }),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|err| StudioError::backend(err.to_string()))?;

        if !response.status().is_success() {
            return Err(StudioError::backend(format!(
                "endpoint returned {}",
                response.status()
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .map_err(|err| StudioError::backend(format!("malformed response: {err}")))?;
        if let Some(message) = parsed.error {
            return Err(StudioError::backend(message));
        }
        let Some(result) = parsed.image else {
            return Err(StudioError::backend("response carried no image payload"));
        };
        UploadedImage::from_base64(&result.data)
            .map_err(|err| StudioError::backend(format!("undecodable result image: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DAILY_LIMIT, Store};
    use image::{DynamicImage, ImageBuffer, Rgba};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_image() -> UploadedImage {
        let img =
            DynamicImage::ImageRgba8(ImageBuffer::from_pixel(2, 2, Rgba([1, 2, 3, 255])));
        UploadedImage::from_dynamic(img).unwrap()
    }

    /// First call fails slowly, every later call succeeds immediately.
    struct FlakyBackend {
        calls: AtomicUsize,
    }

    impl GenerationBackend for FlakyBackend {
        fn generate(
            &self,
            image: &UploadedImage,
            _style: Option<&UploadedImage>,
            _prompt: &str,
        ) -> StudioResult<UploadedImage> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                std::thread::sleep(Duration::from_millis(100));
                Err(StudioError::backend("simulated network error"))
            } else {
                Ok(image.clone())
            }
        }
    }

    #[test]
    fn batch_reports_each_slot_independently() {
        let backend = Arc::new(FlakyBackend {
            calls: AtomicUsize::new(0),
        });
        let mut store = Store::open_at(None);

        // One quota charge for the whole batch, before it is issued.
        store.record_use("ada");
        let rx = spawn_batch(
            backend,
            Arc::new(test_image()),
            None,
            "make it dramatic".to_string(),
            2,
            || {},
        );

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // The fast success arrives while the slow failure is still pending.
        assert!(first.result.is_ok());
        assert!(second.result.is_err());
        assert_ne!(first.slot, second.slot);
        assert_eq!(store.remaining("ada"), DAILY_LIMIT - 1);
    }

    #[test]
    fn every_slot_settles_even_with_failures() {
        struct AlwaysFails;
        impl GenerationBackend for AlwaysFails {
            fn generate(
                &self,
                _image: &UploadedImage,
                _style: Option<&UploadedImage>,
                _prompt: &str,
            ) -> StudioResult<UploadedImage> {
                Err(StudioError::backend("down for maintenance"))
            }
        }

        let rx = spawn_batch(
            Arc::new(AlwaysFails),
            Arc::new(test_image()),
            None,
            "anything".to_string(),
            4,
            || {},
        );
        let mut slots: Vec<usize> = (0..4)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap().slot)
            .collect();
        slots.sort_unstable();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }
}
