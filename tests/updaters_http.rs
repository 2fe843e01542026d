use duna_screen::error::Error;
use duna_screen::events::ImageRef;
use duna_screen::nasa::{ApodApi, NasaApi, Rover, RoverApi};
use duna_screen::sync::{
    ApodSync, DataDirs, RoverCameraSync, RoverHazcamSync, Updater, download_to,
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

const PHOTOS: &str = "/mars-photos/api/v1/rovers/perseverance/photos";
const FRAME_A: &str = "ZL0_0100_0675866208_113EBY_N0040136ZCAM05000_1100LMJ01.png";
const FRAME_B: &str = "ZR0_0100_0675866300_113EBY_N0040136ZCAM05000_1100LMJ01.png";

/// Canned HTTP/1.1 server on loopback. Unknown paths answer 404 and every
/// request target (path plus query) is recorded.
struct NasaFixture {
    addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl NasaFixture {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(Mutex::new(HashMap::<String, Vec<u8>>::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));
        {
            let routes = routes.clone();
            let requests = requests.clone();
            tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let routes = routes.clone();
                    let requests = requests.clone();
                    tokio::spawn(async move {
                        let mut head = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                            match stream.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => head.extend_from_slice(&chunk[..n]),
                            }
                        }
                        let head = String::from_utf8_lossy(&head);
                        let target = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                        let path = target.split('?').next().unwrap_or("/").to_string();
                        requests.lock().unwrap().push(target);

                        let body = routes.lock().unwrap().get(&path).cloned();
                        let (status, body) = match body {
                            Some(body) => ("200 OK", body),
                            None => ("404 Not Found", b"not found".to_vec()),
                        };
                        let header = format!(
                            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        );
                        let _ = stream.write_all(header.as_bytes()).await;
                        let _ = stream.write_all(&body).await;
                        let _ = stream.shutdown().await;
                    });
                }
            });
        }
        Self {
            addr,
            routes,
            requests,
        }
    }

    fn route(&self, path: &str, body: Vec<u8>) {
        self.routes.lock().unwrap().insert(path.to_string(), body);
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn api(&self) -> NasaApi {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        NasaApi::new(client, "DEMO_KEY").with_base_url(format!("http://{}", self.addr))
    }

    fn rover(&self) -> RoverApi {
        RoverApi::new(self.api(), Rover::Perseverance)
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn listing(entries: &[(String, &str)]) -> Vec<u8> {
    let photos: Vec<serde_json::Value> = entries
        .iter()
        .map(|(src, camera)| serde_json::json!({"img_src": src, "camera": {"name": camera}}))
        .collect();
    serde_json::to_vec(&serde_json::json!({ "photos": photos })).unwrap()
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn download_lands_at_the_target_without_leftovers() {
    let server = NasaFixture::start().await;
    server.route("/img/a.jpg", b"jpeg bytes".to_vec());
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("a.jpg");

    download_to(server.api().client(), &server.url("/img/a.jpg"), &target)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&target).unwrap(), b"jpeg bytes");
    assert_eq!(file_names(tmp.path()), vec!["a.jpg"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn empty_download_is_rejected_and_leaves_nothing() {
    let server = NasaFixture::start().await;
    server.route("/img/empty.jpg", Vec::new());
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("empty.jpg");

    let err = download_to(server.api().client(), &server.url("/img/empty.jpg"), &target)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::EmptyDownload(_))
    ));
    assert!(file_names(tmp.path()).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn synced_sol_is_not_fetched_again() {
    let server = NasaFixture::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let sync = RoverCameraSync::new(server.rover(), DataDirs::new(tmp.path()), Some(100), None);
    std::fs::create_dir_all(sync.sync_dir(100)).unwrap();

    assert!(sync.sync().await.unwrap().is_none());
    assert!(server.requests().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_frame_is_skipped_and_the_rest_kept() {
    let server = NasaFixture::start().await;
    server.route(
        PHOTOS,
        listing(&[
            (server.url(&format!("/raw/{FRAME_A}")), "MCZ_LEFT"),
            (server.url(&format!("/raw/{FRAME_B}")), "MCZ_LEFT"),
        ]),
    );
    // frame B is never served
    server.route(&format!("/raw/{FRAME_A}"), b"png bytes".to_vec());

    let tmp = tempfile::tempdir().unwrap();
    let sync = RoverCameraSync::new(server.rover(), DataDirs::new(tmp.path()), Some(100), None);
    let images = sync.sync().await.unwrap().expect("one frame arrived");

    let sync_dir = sync.sync_dir(100);
    assert_eq!(images, vec![ImageRef::Local(sync_dir.join(FRAME_A))]);
    assert_eq!(file_names(&sync_dir), vec![FRAME_A]);
    assert!(
        server
            .requests()
            .iter()
            .any(|target| target.starts_with(PHOTOS)
                && target.contains("api_key=DEMO_KEY")
                && target.contains("sol=100")
                && target.contains("camera=MCZ_LEFT"))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sol_without_any_frame_is_retried_later() {
    let server = NasaFixture::start().await;
    server.route(
        PHOTOS,
        listing(&[(server.url(&format!("/raw/{FRAME_A}")), "MCZ_LEFT")]),
    );

    let tmp = tempfile::tempdir().unwrap();
    let sync = RoverCameraSync::new(server.rover(), DataDirs::new(tmp.path()), Some(100), None);
    assert!(sync.sync().await.unwrap().is_none());
    assert!(!sync.sync_dir(100).exists());

    server.route(&format!("/raw/{FRAME_A}"), b"png bytes".to_vec());
    let images = sync.sync().await.unwrap().expect("retry succeeds");
    assert_eq!(images.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unwanted_frames_leave_no_sol_directory() {
    let server = NasaFixture::start().await;
    let filtered = FRAME_A.replace("EBY", "ECM");
    server.route(
        PHOTOS,
        listing(&[(server.url(&format!("/raw/{filtered}")), "MCZ_LEFT")]),
    );

    let tmp = tempfile::tempdir().unwrap();
    let sync = RoverCameraSync::new(server.rover(), DataDirs::new(tmp.path()), Some(100), None);
    assert!(sync.sync().await.unwrap().is_none());
    assert!(!sync.sync_dir(100).exists());
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hazcam_sol_with_broken_frames_shows_nothing() {
    let server = NasaFixture::start().await;
    let frame = "FLF_0100_0675866208_000ECM_N0040136FHAZ00200_01_295J01.png";
    server.route(
        PHOTOS,
        listing(&[(server.url(&format!("/raw/{frame}")), "FRONT_HAZCAM_LEFT_A")]),
    );
    server.route(&format!("/raw/{frame}"), b"<html>502 Bad Gateway</html>".to_vec());

    let tmp = tempfile::tempdir().unwrap();
    let sync = RoverHazcamSync::new(server.rover(), DataDirs::new(tmp.path()), Some(100));
    assert!(sync.sync().await.unwrap().is_none());
    assert!(!sync.sync_dir(100).exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn apod_follows_the_media_type() {
    let server = NasaFixture::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let sync = ApodSync::new(ApodApi::new(server.api()), tmp.path());

    server.route(
        "/planetary/apod",
        serde_json::to_vec(&serde_json::json!({
            "media_type": "video",
            "url": server.url("/embed/today"),
        }))
        .unwrap(),
    );
    assert!(sync.sync().await.unwrap().is_none());
    assert!(!sync.output_file().exists());

    server.route(
        "/planetary/apod",
        serde_json::to_vec(&serde_json::json!({
            "media_type": "image",
            "url": server.url("/image/today.jpg"),
        }))
        .unwrap(),
    );
    server.route("/image/today.jpg", b"galaxy".to_vec());
    let images = sync.sync().await.unwrap().expect("image day");
    assert_eq!(images, vec![ImageRef::Local(sync.output_file().clone())]);
    assert_eq!(std::fs::read(sync.output_file()).unwrap(), b"galaxy");
    assert!(
        server
            .requests()
            .iter()
            .all(|target| !target.starts_with("/planetary/apod")
                || target.ends_with("?api_key=DEMO_KEY"))
    );
}
