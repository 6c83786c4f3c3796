//! End-to-end workflow tests over a real on-disk store.
//!
//! Images are JSON stand-ins: an array of faces, each face an array of
//! embedding values. `[[0.1, 0.2]]` is one face; `[]` is no face.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use facekit_faceid::{
    Config, Detection, Embedding, EncodingStore, ExtractionError, FaceExtractor, FaceIdError,
    FaceRect, FaceService, IdentityKey, Matcher, ThumbnailError, ThumbnailSink,
};
use tempfile::tempdir;
use tokio::task::JoinSet;

const DIM: usize = 8;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

struct JsonExtractor;

impl FaceExtractor for JsonExtractor {
    fn extract(&self, image: &[u8]) -> Result<Detection, ExtractionError> {
        let faces: Vec<Vec<f32>> = serde_json::from_slice(image)
            .map_err(|e| ExtractionError::DecodeFailure(e.to_string()))?;
        match faces.len() {
            0 => Err(ExtractionError::NoFaceDetected),
            1 => {
                let values = faces.into_iter().next().unwrap_or_default();
                let embedding =
                    Embedding::new(values).map_err(|e| ExtractionError::Model(e.to_string()))?;
                Ok(Detection {
                    embedding,
                    face: FaceRect {
                        left: 10,
                        top: 10,
                        right: 50,
                        bottom: 60,
                    },
                })
            }
            n => Err(ExtractionError::MultipleFacesDetected(n)),
        }
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

struct SlowExtractor(Duration);

impl FaceExtractor for SlowExtractor {
    fn extract(&self, image: &[u8]) -> Result<Detection, ExtractionError> {
        std::thread::sleep(self.0);
        JsonExtractor.extract(image)
    }

    fn dimension(&self) -> usize {
        DIM
    }
}

struct BrokenSink;

impl ThumbnailSink for BrokenSink {
    fn save(&self, _: &IdentityKey, _: &[u8], _: &FaceRect) -> Result<(), ThumbnailError> {
        Err(ThumbnailError::Io(std::io::Error::other("disk full")))
    }
}

fn image_of(v: f32) -> Vec<u8> {
    face_image(&[v; DIM])
}

fn face_image(values: &[f32]) -> Vec<u8> {
    serde_json::to_vec(&vec![values.to_vec()]).unwrap()
}

fn config(dir: &std::path::Path) -> Config {
    Config {
        data_dir: dir.join("data"),
        dimension: DIM,
        ..Config::default()
    }
}

#[tokio::test]
async fn scenario_register_recognize_verify() {
    init_logging();
    let dir = tempdir().unwrap();
    let svc = FaceService::open(&config(dir.path()), Arc::new(JsonExtractor)).unwrap();

    let k1 = svc.register(image_of(0.1)).await.unwrap();
    let k2 = svc.register(image_of(0.5)).await.unwrap();
    assert_ne!(k1, k2);

    // A slightly different photo of face A.
    let mut a2 = [0.1; DIM];
    a2[0] = 0.15;
    let rec = svc.recognize(face_image(&a2)).await.unwrap();
    assert!(rec.matched);
    assert_eq!(rec.identity, Some(k1));

    // Unrelated face C: more than 0.6 from both A and B.
    let rec = svc.recognize(image_of(-0.4)).await.unwrap();
    assert!(!rec.matched);
    assert_eq!(rec.identity, None);

    assert!(svc.verify(image_of(0.1), k1).await.unwrap());
    assert!(!svc.verify(image_of(0.1), k2).await.unwrap());
}

#[tokio::test]
async fn self_match_for_every_registration() {
    let dir = tempdir().unwrap();
    let svc = FaceService::open(&config(dir.path()), Arc::new(JsonExtractor)).unwrap();

    let mut enrolled = Vec::new();
    for i in 0..5 {
        let img = image_of(i as f32);
        enrolled.push((svc.register(img.clone()).await.unwrap(), img));
    }
    for (key, img) in enrolled {
        let rec = svc.recognize(img.clone()).await.unwrap();
        assert_eq!(rec.identity, Some(key));
        assert_eq!(rec.distance, Some(0.0));
        assert!(svc.verify(img, key).await.unwrap());
    }
}

#[tokio::test]
async fn empty_store_and_unknown_identity() {
    let dir = tempdir().unwrap();
    let svc = FaceService::open(&config(dir.path()), Arc::new(JsonExtractor)).unwrap();

    let rec = svc.recognize(image_of(0.3)).await.unwrap();
    assert_eq!((rec.matched, rec.identity), (false, None));
    assert!(!svc.verify(image_of(0.3), IdentityKey::generate()).await.unwrap());

    svc.register(image_of(0.3)).await.unwrap();
    assert!(!svc.verify(image_of(0.3), IdentityKey::generate()).await.unwrap());
}

#[tokio::test]
async fn rejected_images() {
    let dir = tempdir().unwrap();
    let svc = FaceService::open(&config(dir.path()), Arc::new(JsonExtractor)).unwrap();

    let cases = [
        (&b"\x89PNG garbage"[..], "decode"),
        (&b"[]"[..], "no face"),
        (&b"[[0,0,0,0,0,0,0,0],[1,1,1,1,1,1,1,1]]"[..], "multiple"),
    ];
    for (img, kind) in cases {
        let err = svc.register(img.to_vec()).await.unwrap_err();
        let expected = match (&err, kind) {
            (FaceIdError::Extraction(ExtractionError::DecodeFailure(_)), "decode") => true,
            (FaceIdError::Extraction(ExtractionError::NoFaceDetected), "no face") => true,
            (FaceIdError::Extraction(ExtractionError::MultipleFacesDetected(2)), "multiple") => {
                true
            }
            _ => false,
        };
        assert!(expected, "{kind}: unexpected error: {err}");
        assert!(err.is_input_error());

        let err = svc.recognize(img.to_vec()).await.unwrap_err();
        assert!(err.is_input_error());
    }
    assert!(svc.store().is_empty());
}

#[tokio::test]
async fn snapshot_survives_restart() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());

    let (keys, before) = {
        let svc = FaceService::open(&cfg, Arc::new(JsonExtractor)).unwrap();
        let mut keys = Vec::new();
        for i in 0..6 {
            keys.push(svc.register(image_of(i as f32 * 1.5)).await.unwrap());
        }
        let before = svc.store().read_all();
        svc.close();
        (keys, before)
    };

    let svc = FaceService::open(&cfg, Arc::new(JsonExtractor)).unwrap();
    assert_eq!(svc.store().read_all(), before);
    let rec = svc.recognize(image_of(3.0)).await.unwrap();
    assert_eq!(rec.identity, Some(keys[2]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_registrations() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let svc = Arc::new(FaceService::open(&cfg, Arc::new(JsonExtractor)).unwrap());

    let mut tasks = JoinSet::new();
    for i in 0..24 {
        let svc = Arc::clone(&svc);
        tasks.spawn(async move { svc.register(image_of(i as f32)).await });
    }

    let mut keys = HashSet::new();
    while let Some(res) = tasks.join_next().await {
        keys.insert(res.unwrap().unwrap());
    }
    assert_eq!(keys.len(), 24);

    // The snapshot on disk parses and holds every key.
    let reopened = EncodingStore::open(cfg.snapshot_path(), DIM).unwrap();
    assert_eq!(reopened.len(), 24);
    assert!(keys.iter().all(|k| reopened.contains(k)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn extraction_timeout_does_not_block_store() {
    let dir = tempdir().unwrap();
    let store = Arc::new(EncodingStore::open(dir.path().join("enc.bin"), DIM).unwrap());

    let slow = FaceService::new(
        Arc::clone(&store),
        Arc::new(SlowExtractor(Duration::from_millis(500))),
        Matcher::default(),
    )
    .unwrap()
    .with_extract_timeout(Some(Duration::from_millis(50)));
    let fast = FaceService::new(Arc::clone(&store), Arc::new(JsonExtractor), Matcher::default())
        .unwrap();

    let (slow_res, fast_res) = tokio::join!(
        slow.register(image_of(1.0)),
        fast.register(image_of(2.0))
    );

    assert!(matches!(slow_res, Err(FaceIdError::ExtractionTimeout(_))));
    let key = fast_res.unwrap();
    assert_eq!(store.len(), 1);
    assert!(store.contains(&key));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelled_registration_leaves_store_usable() {
    let dir = tempdir().unwrap();
    let store = Arc::new(EncodingStore::open(dir.path().join("enc.bin"), DIM).unwrap());
    let slow = FaceService::new(
        Arc::clone(&store),
        Arc::new(SlowExtractor(Duration::from_millis(300))),
        Matcher::default(),
    )
    .unwrap();

    let cancelled =
        tokio::time::timeout(Duration::from_millis(30), slow.register(image_of(1.0))).await;
    assert!(cancelled.is_err());

    let fast = FaceService::new(Arc::clone(&store), Arc::new(JsonExtractor), Matcher::default())
        .unwrap();
    fast.register(image_of(2.0)).await.unwrap();
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn thumbnail_failure_does_not_fail_registration() {
    init_logging();
    let dir = tempdir().unwrap();
    let svc = FaceService::open(&config(dir.path()), Arc::new(JsonExtractor))
        .unwrap()
        .with_thumbnails(Arc::new(BrokenSink));

    let key = svc.register(image_of(0.2)).await.unwrap();
    assert!(svc.store().contains(&key));
}

#[tokio::test]
async fn undecodable_thumbnail_is_skipped() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let svc = FaceService::open(&cfg, Arc::new(JsonExtractor)).unwrap();

    // The JSON stand-in is not a real picture, so cropping fails quietly.
    let key = svc.register(image_of(0.7)).await.unwrap();
    assert!(svc.store().contains(&key));
    assert!(!cfg.thumbnails_path().join(format!("{key}.jpg")).exists());
}
