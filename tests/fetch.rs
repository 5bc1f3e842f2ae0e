use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use kira_sra::domain::Accession;
use kira_sra::error::KiraError;
use kira_sra::fetch::{MetadataFetcher, MetadataTransport, TransportResponse};
use kira_sra::sleeper::Sleeper;

const FIXTURE: &str = include_str!("fixtures/experiment_package.xml");

#[derive(Default)]
struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

struct ScriptedTransport {
    responses: Mutex<VecDeque<TransportResponse>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<(u16, &str)>) -> Self {
        Self {
            responses: Mutex::new(
                responses
                    .into_iter()
                    .map(|(status, body)| TransportResponse {
                        status,
                        body: body.to_string(),
                    })
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl MetadataTransport for ScriptedTransport {
    fn get(&self, accession: &Accession) -> Result<TransportResponse, KiraError> {
        self.requests
            .lock()
            .unwrap()
            .push(accession.as_str().to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| KiraError::SraHttp("no scripted response".to_string()))
    }
}

fn accession() -> Accession {
    "SRP100".parse().unwrap()
}

#[test]
fn rate_limit_backs_off_linearly_until_success() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        (429, "slow down"),
        (429, "slow down"),
        (200, FIXTURE),
    ]));
    let sleeper = Arc::new(RecordingSleeper::default());
    let fetcher = MetadataFetcher::new(transport.clone())
        .with_sleeper(sleeper.clone())
        .with_jitter(|| 0.5);

    let raw = fetcher.fetch(&accession(), None).unwrap();

    assert_eq!(raw.xml, FIXTURE);
    assert_eq!(transport.requests.lock().unwrap().len(), 3);
    assert_eq!(
        *sleeper.sleeps.lock().unwrap(),
        vec![Duration::from_secs_f64(1.5), Duration::from_secs_f64(2.5)]
    );
}

#[test]
fn other_status_fails_without_retry() {
    let transport = Arc::new(ScriptedTransport::new(vec![(500, "internal error")]));
    let sleeper = Arc::new(RecordingSleeper::default());
    let fetcher = MetadataFetcher::new(transport.clone()).with_sleeper(sleeper.clone());

    let err = fetcher.fetch(&accession(), None).unwrap_err();

    assert_matches!(err, KiraError::SraStatus { status: 500, .. });
    assert_eq!(transport.requests.lock().unwrap().len(), 1);
    assert!(sleeper.sleeps.lock().unwrap().is_empty());
}

#[test]
fn transport_error_is_propagated() {
    let transport = ScriptedTransport::new(Vec::new());
    let fetcher = MetadataFetcher::new(transport);
    assert_matches!(
        fetcher.fetch(&accession(), None),
        Err(KiraError::SraHttp(_))
    );
}

#[test]
fn raw_document_is_written_verbatim() {
    let temp = tempfile::tempdir().unwrap();
    let sink = Utf8PathBuf::from_path_buf(temp.path().join("raw").join("SRP100.xml")).unwrap();
    let transport = ScriptedTransport::new(vec![(200, FIXTURE)]);
    let fetcher = MetadataFetcher::new(transport);

    let raw = fetcher.fetch(&accession(), Some(&sink)).unwrap();

    assert_eq!(std::fs::read_to_string(&sink).unwrap(), FIXTURE);
    assert_eq!(raw.normalize(None).unwrap().len(), 3);
}

#[test]
fn raw_document_is_kept_even_when_unparseable() {
    let temp = tempfile::tempdir().unwrap();
    let sink = Utf8PathBuf::from_path_buf(temp.path().join("raw.xml")).unwrap();
    let fetcher = MetadataFetcher::new(ScriptedTransport::new(vec![(200, "<broken")]));

    let raw = fetcher.fetch(&accession(), Some(&sink)).unwrap();

    assert_eq!(std::fs::read_to_string(&sink).unwrap(), "<broken");
    assert_matches!(raw.normalize(None), Err(KiraError::MetadataParse(_)));
}
