use duna_screen::channels::RotationPosition;
use duna_screen::config::Configuration;
use duna_screen::events::{ImageRef, NavCommand};
use duna_screen::slideshow::Slideshow;
use duna_screen::sync::{SyncResult, Updater};
use duna_screen::tasks::display::{DisplayChannel, DisplayOutput, DisplayTiming, UpdatePolicy};
use duna_screen::tasks::viewer::Viewer;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingViewer {
    shown: Mutex<Vec<ImageRef>>,
}

impl RecordingViewer {
    fn names(&self) -> Vec<String> {
        self.shown
            .lock()
            .unwrap()
            .iter()
            .map(|image| image.to_string())
            .collect()
    }
}

impl Viewer for RecordingViewer {
    fn show(&self, image: &ImageRef) {
        self.shown.lock().unwrap().push(image.clone());
    }
}

/// Returns the same answer on every sync and counts calls.
struct FixedUpdater {
    refs: Option<Vec<ImageRef>>,
    fail: bool,
    calls: Arc<AtomicUsize>,
}

impl FixedUpdater {
    fn new(refs: Option<Vec<ImageRef>>) -> Self {
        Self {
            refs,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing() -> Self {
        Self {
            refs: None,
            fail: true,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Updater for FixedUpdater {
    fn name(&self) -> String {
        "fixed".into()
    }

    fn sync(&self) -> BoxFuture<'_, SyncResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail {
            Err(anyhow::anyhow!("network unreachable"))
        } else {
            Ok(self.refs.clone())
        };
        async move { result }.boxed()
    }
}

fn refs(prefix: &str, n: usize) -> Vec<ImageRef> {
    (0..n)
        .map(|i| ImageRef::Local(PathBuf::from(format!("/{prefix}{i}.jpg"))))
        .collect()
}

fn timing() -> DisplayTiming {
    DisplayTiming {
        interval: Duration::from_secs(10),
        update_interval: Duration::from_secs(3600),
        first_update_delay: Duration::from_secs(30),
    }
}

fn slideshow(viewer: &Arc<RecordingViewer>, images: Vec<ImageRef>) -> Arc<Slideshow> {
    let show = Arc::new(Slideshow::new(viewer.clone()));
    show.add(images);
    show
}

#[tokio::test]
async fn failing_channel_does_not_block_the_others() {
    let viewer = Arc::new(RecordingViewer::default());
    let broken = slideshow(&viewer, refs("old", 2));
    let healthy = slideshow(&viewer, refs("stale", 1));

    let mut output = DisplayOutput::new(timing());
    output.add_channel(
        DisplayChannel::new("broken", broken.clone(), UpdatePolicy::Replace)
            .with_updater(FixedUpdater::failing()),
        None,
    );
    output.add_channel(
        DisplayChannel::new("healthy", healthy.clone(), UpdatePolicy::Replace)
            .with_updater(FixedUpdater::new(Some(refs("new", 3)))),
        None,
    );

    output.update().await;

    assert_eq!(broken.images(), refs("old", 2));
    assert_eq!(healthy.images(), refs("new", 3));
    assert_eq!(output.root().len(), 5);
}

#[tokio::test]
async fn content_refresh_keeps_the_rotation_counter() {
    let viewer = Arc::new(RecordingViewer::default());
    let first = slideshow(&viewer, refs("a", 3));
    let second = slideshow(&viewer, refs("b", 2));

    let mut output = DisplayOutput::new(timing());
    output.add_channel(
        DisplayChannel::new("first", first.clone(), UpdatePolicy::Replace)
            .with_updater(FixedUpdater::new(Some(refs("c", 4)))),
        None,
    );
    output.add_channel(
        DisplayChannel::new("second", second, UpdatePolicy::Replace),
        None,
    );

    output.next_image();
    output.next_image();
    assert_eq!(
        output.root().position(),
        RotationPosition {
            channel: 0,
            counter: 2
        }
    );

    output.update().await;
    assert_eq!(first.len(), 4);
    assert_eq!(
        output.root().position(),
        RotationPosition {
            channel: 0,
            counter: 2
        }
    );

    // the new contents raise the budget to 4, so the visit continues
    output.next_image();
    assert_eq!(output.root().position().channel, 0);
    output.next_image();
    assert_eq!(output.root().position().channel, 1);
}

#[tokio::test(start_paused = true)]
async fn run_loop_ticks_updates_and_follows_commands() {
    let viewer = Arc::new(RecordingViewer::default());
    let updater = FixedUpdater::new(None);
    let update_calls = updater.calls.clone();

    let mut output = DisplayOutput::new(timing());
    output.add_channel(
        DisplayChannel::new("only", slideshow(&viewer, refs("a", 3)), UpdatePolicy::Replace)
            .with_updater(updater),
        None,
    );
    let output = Arc::new(output);

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel(4);
    let handle = tokio::spawn({
        let output = output.clone();
        let cancel = cancel.clone();
        async move { output.run(cancel, rx).await }
    });

    sleep(Duration::from_secs(25)).await;
    assert_eq!(viewer.names(), vec!["/a1.jpg", "/a2.jpg", "/a0.jpg"]);
    assert_eq!(update_calls.load(Ordering::SeqCst), 0);

    sleep(Duration::from_secs(10)).await;
    assert_eq!(update_calls.load(Ordering::SeqCst), 1);
    assert_eq!(viewer.names().len(), 4);

    tx.send(NavCommand::Previous).await.unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(
        viewer.names(),
        vec!["/a1.jpg", "/a2.jpg", "/a0.jpg", "/a1.jpg", "/a0.jpg"]
    );

    tx.send(NavCommand::Next).await.unwrap();
    sleep(Duration::from_millis(1)).await;
    assert_eq!(viewer.names().last().map(String::as_str), Some("/a1.jpg"));

    cancel.cancel();
    handle.await.unwrap().unwrap();

    let shown = viewer.names().len();
    sleep(Duration::from_secs(7200)).await;
    assert_eq!(viewer.names().len(), shown);
    assert_eq!(update_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn closed_command_channel_keeps_the_display_running() {
    let viewer = Arc::new(RecordingViewer::default());
    let mut output = DisplayOutput::new(timing());
    output.add_channel(
        DisplayChannel::new("only", slideshow(&viewer, refs("a", 2)), UpdatePolicy::Replace),
        None,
    );
    let output = Arc::new(output);

    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel::<NavCommand>(1);
    drop(tx);
    let handle = tokio::spawn({
        let output = output.clone();
        let cancel = cancel.clone();
        async move { output.run(cancel, rx).await }
    });

    sleep(Duration::from_secs(15)).await;
    assert!(!handle.is_finished());
    assert_eq!(viewer.names().len(), 2);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn builds_channels_from_config() {
    let tmp = tempfile::tempdir().unwrap();
    let photos = tmp.path().join("photos");
    std::fs::create_dir_all(photos.join("nested")).unwrap();
    std::fs::write(photos.join("b.jpg"), b"x").unwrap();
    std::fs::write(photos.join("nested").join("a.png"), b"x").unwrap();
    std::fs::write(photos.join("notes.txt"), b"x").unwrap();

    let yaml = format!(
        r#"
data-dir: "{data}"
channels:
  - type: static
    urls: ["https://apod.nasa.gov/", "file:///srv/frame/welcome.jpg"]
  - type: directory
    path: "{photos}"
    sequence-limit: 1
"#,
        data = tmp.path().display(),
        photos = photos.display()
    );
    let cfg = Configuration::from_yaml_str(&yaml)
        .unwrap()
        .validated()
        .unwrap();

    let viewer = Arc::new(RecordingViewer::default());
    let output = DisplayOutput::from_config(&cfg, viewer.clone(), reqwest::Client::new()).unwrap();

    assert_eq!(output.channels().len(), 2);
    assert_eq!(output.root().len(), 4);
    assert_eq!(
        output.channels()[0].slideshow().images(),
        vec![
            ImageRef::Remote("https://apod.nasa.gov/".into()),
            ImageRef::Local(PathBuf::from("/srv/frame/welcome.jpg")),
        ]
    );
    assert_eq!(
        output.channels()[1].slideshow().images(),
        vec![
            ImageRef::Local(photos.join("b.jpg")),
            ImageRef::Local(photos.join("nested").join("a.png")),
        ]
    );
    assert_eq!(output.channels()[0].policy(), UpdatePolicy::Refresh);
    assert_eq!(output.channels()[1].policy(), UpdatePolicy::Replace);

    // an unchanged directory reports nothing new
    assert!(!output.channels()[1].update().await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn relative_static_files_resolve_under_the_data_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let yaml = format!(
        r#"
data-dir: "{data}"
channels:
  - type: static
    urls: ["slideshow/nasa-apod.jpg", "file:///srv/frame/welcome.jpg"]
    updates: [apod]
"#,
        data = tmp.path().display()
    );
    let cfg = Configuration::from_yaml_str(&yaml)
        .unwrap()
        .validated()
        .unwrap();

    let viewer = Arc::new(RecordingViewer::default());
    let output = DisplayOutput::from_config(&cfg, viewer, reqwest::Client::new()).unwrap();

    let apod = duna_screen::sync::DataDirs::new(tmp.path())
        .slideshow()
        .join("nasa-apod.jpg");
    assert_eq!(
        output.channels()[0].slideshow().images(),
        vec![
            ImageRef::Local(apod),
            ImageRef::Local(PathBuf::from("/srv/frame/welcome.jpg")),
        ]
    );
}
