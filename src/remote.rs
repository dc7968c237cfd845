//! Re-aggregation of the call tree for a time range.
//!
//! The viewer never blocks on a refresh: each request runs on its own worker
//! thread and the result is handed back over a channel, tagged with the
//! request's sequence number.

use crate::error::{Error, Result};
use crate::range::{RefreshRequest, TimeRange};
use crate::storage;
use crate::tree::Dataset;
use crate::tree::aggregate::build_dataset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000/time";
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Something that can rebuild the call tree for a time range
pub trait Reaggregate: Send + Sync {
    fn reaggregate(&self, range: &TimeRange) -> Result<Dataset>;
}

/// Body of `POST /time`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRequest {
    pub string1: String,
    pub string2: String,
}

impl From<&TimeRange> for TimeRequest {
    fn from(range: &TimeRange) -> Self {
        let (string1, string2) = range.wire_strings();
        TimeRequest { string1, string2 }
    }
}

/// Response of `POST /time`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeResponse {
    pub data: Dataset,
}

impl TimeResponse {
    /// Parse a response body and number its nodes
    pub fn decode(body: &str) -> Result<Dataset> {
        let response: TimeResponse = serde_json::from_str(body)?;
        Ok(response.into_dataset())
    }

    pub fn into_dataset(self) -> Dataset {
        Dataset::new(self.data.root, self.data.unique_threads)
    }
}

/// Re-aggregation through an HTTP endpoint
pub struct HttpAggregator {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpAggregator {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(HttpAggregator {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl Reaggregate for HttpAggregator {
    fn reaggregate(&self, range: &TimeRange) -> Result<Dataset> {
        let body = TimeRequest::from(range);
        log::debug!("POST {} {:?}", self.endpoint, body);

        let response: TimeResponse = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()?
            .error_for_status()?
            .json()?;
        Ok(response.into_dataset())
    }
}

/// Re-aggregation straight from the profile database
pub struct LocalAggregator {
    path: PathBuf,
    merge_threads: bool,
}

impl LocalAggregator {
    pub fn new(path: impl Into<PathBuf>, merge_threads: bool) -> Self {
        LocalAggregator {
            path: path.into(),
            merge_threads,
        }
    }
}

impl Reaggregate for LocalAggregator {
    fn reaggregate(&self, range: &TimeRange) -> Result<Dataset> {
        let conn = storage::open(&self.path)?;
        let records = storage::load_allocations(&conn, Some(*range))?;
        log::debug!("Re-aggregating {} records for {range}", records.len());
        Ok(build_dataset(records, self.merge_threads))
    }
}

#[derive(Debug)]
pub struct RefreshResponse {
    pub seq: u64,
    pub range: TimeRange,
    pub result: Result<Dataset>,
}

/// Runs re-aggregation requests off the UI thread
pub struct RefreshWorker {
    source: Arc<dyn Reaggregate>,
    tx: Sender<RefreshResponse>,
    rx: Receiver<RefreshResponse>,
}

impl RefreshWorker {
    pub fn new(source: Arc<dyn Reaggregate>) -> Self {
        let (tx, rx) = mpsc::channel();
        RefreshWorker { source, tx, rx }
    }

    /// Start a request. Earlier in-flight requests keep running; their
    /// responses are sorted out by sequence number.
    pub fn dispatch(&self, request: RefreshRequest) -> Result<()> {
        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        std::thread::Builder::new()
            .name("memview-refresh".into())
            .spawn(move || {
                let result = source.reaggregate(&request.range);
                // The receiver is gone only when the viewer has exited
                let _ = tx.send(RefreshResponse {
                    seq: request.seq,
                    range: request.range,
                    result,
                });
            })
            .map_err(Error::Io)?;
        Ok(())
    }

    pub fn try_recv(&self) -> Option<RefreshResponse> {
        self.rx.try_recv().ok()
    }

    /// Block until the next response arrives or `timeout` passes
    pub fn recv_timeout(&self, timeout: Duration) -> Option<RefreshResponse> {
        self.rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::parse_timestamp;
    use crate::tree::CallTree;
    use pretty_assertions::assert_eq;

    struct Fixed(u64);

    impl Reaggregate for Fixed {
        fn reaggregate(&self, _range: &TimeRange) -> Result<Dataset> {
            let mut root = CallTree::root();
            root.value = self.0;
            Ok(Dataset::new(root, Vec::new()))
        }
    }

    struct Failing;

    impl Reaggregate for Failing {
        fn reaggregate(&self, range: &TimeRange) -> Result<Dataset> {
            Err(Error::InvalidArgument(format!("no data for {range}")))
        }
    }

    #[test]
    fn test_request_body() {
        let range = TimeRange::new(
            parse_timestamp("2024-03-01 10:00:05").unwrap(),
            parse_timestamp("2024-03-01 10:00:00.5").unwrap(),
        );
        let body = serde_json::to_value(TimeRequest::from(&range)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "string1": "2024-03-01 10:00:00.500000",
                "string2": "2024-03-01 10:00:05.000000",
            })
        );
    }

    #[test]
    fn test_response_is_renumbered() {
        let body = r#"{"data": {
            "name": "<root>", "value": 3, "n_allocations": 1,
            "children": [
                {"id": 40, "name": "f", "value": 2},
                {"id": 41, "name": "g", "value": 1}
            ],
            "unique_threads": ["0x1", "0x2"]
        }}"#;
        let dataset = TimeResponse::decode(body).unwrap();
        let ids: Vec<u64> = dataset.root.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(dataset.unique_threads.len(), 2);

        assert!(TimeResponse::decode(r#"{"result": 1}"#).is_err());
    }

    /// Answer a single HTTP request with `status` and `body`, returning the
    /// endpoint URL and a handle yielding the request line and body received
    fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, std::thread::JoinHandle<(String, String)>) {
        use std::io::{BufRead, BufReader, Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/time", listener.local_addr().unwrap());
        let handle = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());

            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut content_length = 0;
            loop {
                let mut header = String::new();
                reader.read_line(&mut header).unwrap();
                let header = header.trim_end();
                if header.is_empty() {
                    break;
                }
                if let Some((name, value)) = header.split_once(':')
                    && name.eq_ignore_ascii_case("content-length")
                {
                    content_length = value.trim().parse().unwrap();
                }
            }
            let mut request_body = vec![0; content_length];
            reader.read_exact(&mut request_body).unwrap();

            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            stream.flush().unwrap();
            (
                request_line.trim_end().to_string(),
                String::from_utf8(request_body).unwrap(),
            )
        });
        (url, handle)
    }

    #[test]
    fn test_http_aggregator_posts_range() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"data": {"name": "<root>", "value": 5, "children": [{"id": 9, "name": "f", "value": 5}], "unique_threads": ["0x1"]}}"#,
        );
        let aggregator = HttpAggregator::new(url).unwrap();
        let range = TimeRange::new(0, 1_500);

        let dataset = aggregator.reaggregate(&range).unwrap();
        assert_eq!(dataset.root.value, 5);
        assert_eq!(dataset.root.children[0].id, 1);
        assert_eq!(dataset.unique_threads, vec!["0x1".to_string()]);

        let (request_line, body) = server.join().unwrap();
        assert_eq!(request_line, "POST /time HTTP/1.1");
        let body: TimeRequest = serde_json::from_str(&body).unwrap();
        assert_eq!(body, TimeRequest::from(&range));
    }

    #[test]
    fn test_http_aggregator_rejects_error_status() {
        let (url, server) = serve_once("500 Internal Server Error", r#"{"error": "boom"}"#);
        let aggregator = HttpAggregator::new(url).unwrap();

        let result = aggregator.reaggregate(&TimeRange::new(0, 10));
        assert!(matches!(result, Err(Error::Http(_))));
        server.join().unwrap();
    }

    #[test]
    fn test_worker_round_trip() {
        let worker = RefreshWorker::new(Arc::new(Fixed(42)));
        let range = TimeRange::new(0, 10);
        worker.dispatch(RefreshRequest { seq: 7, range }).unwrap();

        let response = worker.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(response.seq, 7);
        assert_eq!(response.range, range);
        assert_eq!(response.result.unwrap().root.value, 42);
    }

    #[test]
    fn test_worker_reports_errors() {
        let worker = RefreshWorker::new(Arc::new(Failing));
        worker
            .dispatch(RefreshRequest {
                seq: 1,
                range: TimeRange::new(0, 1),
            })
            .unwrap();

        let response = worker.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(response.result.is_err());
    }
}
