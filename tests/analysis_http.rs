//! HTTP analysis transport against a local fake service.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use moodcam::{AnalysisError, Annotation, AnnotationClient, Frame, HttpTransport};

/// Accept one connection, capture the request body, reply with `status`/`body`.
fn serve_once(status: &'static str, body: &'static [u8]) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/process_frame", listener.local_addr().unwrap());
    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let request = read_request_body(&stream);
        let mut stream = stream;
        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        );
        stream.write_all(head.as_bytes()).unwrap();
        stream.write_all(body).unwrap();
        stream.flush().unwrap();
        request
    });
    (url, handle)
}

fn read_request_body(stream: &TcpStream) -> String {
    let mut reader = BufReader::new(stream);
    let mut content_length = None;
    let mut chunked = false;
    loop {
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            content_length = value.trim().parse::<usize>().ok();
        }
        if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
            chunked = true;
        }
    }

    if let Some(len) = content_length {
        let mut body = vec![0u8; len];
        reader.read_exact(&mut body).unwrap();
        return String::from_utf8(body).unwrap();
    }
    if chunked {
        let mut body = Vec::new();
        loop {
            let mut size_line = String::new();
            reader.read_line(&mut size_line).unwrap();
            let size = usize::from_str_radix(size_line.trim(), 16).unwrap();
            if size == 0 {
                let mut trailer = String::new();
                reader.read_line(&mut trailer).unwrap();
                break;
            }
            let mut chunk = vec![0u8; size + 2];
            reader.read_exact(&mut chunk).unwrap();
            body.extend_from_slice(&chunk[..size]);
        }
        return String::from_utf8(body).unwrap();
    }
    String::new()
}

fn frame() -> Frame {
    Frame::from_rgb(32, 24, vec![128; 32 * 24 * 3]).unwrap()
}

fn client(url: &str) -> AnnotationClient {
    AnnotationClient::new(Box::new(HttpTransport::new(
        url,
        Some(Duration::from_secs(5)),
    )))
}

#[test]
fn posts_data_url_and_maps_boxes() {
    let (url, server) = serve_once(
        "200 OK",
        br#"{"bounding_boxes":[{"x":10,"y":10,"width":50,"height":50,"mood":"happy"}]}"#,
    );
    let mut client = client(&url);
    let annotations = client.try_analyze(&frame()).unwrap();
    assert_eq!(
        annotations,
        vec![Annotation::new(10.0, 10.0, 50.0, 50.0, "happy")]
    );

    let request: serde_json::Value = serde_json::from_str(&server.join().unwrap()).unwrap();
    let image = request["image"].as_str().unwrap();
    assert!(image.starts_with("data:image/jpeg;base64,"));
    let bytes = moodcam::frame::decode_data_url(image).unwrap();
    let decoded = Frame::decode(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (32, 24));
}

#[test]
fn empty_box_list_is_a_successful_empty_result() {
    let (url, server) = serve_once("200 OK", br#"{"bounding_boxes":[]}"#);
    let mut client = client(&url);
    assert!(client.analyze(&frame()).is_empty());
    assert_eq!(client.failures(), 0);
    server.join().unwrap();
}

#[test]
fn error_status_is_reported_and_falls_back() {
    let (url, server) = serve_once("500 Internal Server Error", br#"{"error":"model crashed"}"#);
    let mut client = client(&url);
    match client.try_analyze(&frame()) {
        Err(AnalysisError::Status { status, body }) => {
            assert_eq!(status, 500);
            assert!(body.contains("model crashed"));
        }
        other => panic!("expected status error, got {:?}", other),
    }
    server.join().unwrap();

    let (url, server) = serve_once("500 Internal Server Error", br#"{"error":"model crashed"}"#);
    let mut client = self::client(&url);
    assert!(client.analyze(&frame()).is_empty());
    assert_eq!(client.failures(), 1);
    server.join().unwrap();
}

#[test]
fn malformed_body_is_reported() {
    let (url, server) = serve_once("200 OK", b"this is not json");
    let mut client = client(&url);
    assert!(matches!(
        client.try_analyze(&frame()),
        Err(AnalysisError::Malformed(_))
    ));
    server.join().unwrap();
}

#[test]
fn non_utf8_body_is_malformed() {
    let (url, server) = serve_once("200 OK", &[0xFF, 0xFE, 0x7B, 0x80, 0x7D]);
    let mut client = client(&url);
    assert!(matches!(
        client.try_analyze(&frame()),
        Err(AnalysisError::Malformed(_))
    ));
    server.join().unwrap();
}

#[test]
fn missing_field_is_malformed() {
    let (url, server) = serve_once("200 OK", br#"{"boxes":[]}"#);
    let mut client = client(&url);
    assert!(matches!(
        client.try_analyze(&frame()),
        Err(AnalysisError::Malformed(_))
    ));
    server.join().unwrap();
}

#[test]
fn refused_connection_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/process_frame", listener.local_addr().unwrap());
    drop(listener);

    let mut client = client(&url);
    assert!(matches!(
        client.try_analyze(&frame()),
        Err(AnalysisError::Transport(_))
    ));
    assert!(client.analyze(&frame()).is_empty());
}

#[test]
fn stalled_service_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/process_frame", listener.local_addr().unwrap());
    let server = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        std::thread::sleep(Duration::from_secs(2));
        drop(stream);
    });

    let mut client = AnnotationClient::new(Box::new(HttpTransport::new(
        &url,
        Some(Duration::from_millis(300)),
    )));
    let started = Instant::now();
    assert!(matches!(
        client.try_analyze(&frame()),
        Err(AnalysisError::Transport(_))
    ));
    assert!(started.elapsed() < Duration::from_secs(2));
    server.join().unwrap();
}
