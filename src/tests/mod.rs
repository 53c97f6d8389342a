use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::api::{ApiClient, Backend, RequestError};
use crate::app::{App, AppError};
use crate::form::{FormError, FormField, ModalIntent};
use crate::model::{self, CountMap, HospitalRecord, SearchFilters, Statistics};
use crate::output::{Alert, AlertLevel, NO_RESULTS};
use crate::transfer::{self, TransferError};

const REGIONS: [&str; 3] = ["Casablanca-Settat", "Rabat-Salé-Kénitra", "Souss-Massa"];
const CATEGORIES: [&str; 3] = ["CHU", "CHR", "CHP"];

fn hospital(n: usize) -> HospitalRecord {
    HospitalRecord {
        id: Some(format!("HOSP_{n:04}")),
        name: Some(format!("Hôpital {n}")),
        region: Some(REGIONS[n % 3].to_string()),
        delegation: Some(format!("Délégation {}", n % 5)),
        commune: Some(format!("Commune {n}")),
        category: Some(CATEGORIES[n % 3].to_string()),
        extra: Default::default(),
    }
}

fn counts<'a>(values: impl Iterator<Item = &'a str>) -> CountMap {
    let mut out: Vec<(String, u64)> = Vec::new();
    for value in values {
        match out.iter_mut().find(|(label, _)| label == value) {
            Some((_, count)) => *count += 1,
            None => out.push((value.to_string(), 1)),
        }
    }
    CountMap(out)
}

fn contains(field: &Option<String>, needle: &str) -> bool {
    needle.is_empty()
        || field
            .as_deref()
            .unwrap_or_default()
            .to_lowercase()
            .contains(&needle.to_lowercase())
}

/// In-memory directory service that counts every call it receives.
#[derive(Default)]
struct FakeBackend {
    records: Mutex<Vec<HospitalRecord>>,
    failure: Mutex<Option<RequestError>>,
    read_failure: Mutex<Option<RequestError>>,
    calls: AtomicUsize,
}

impl FakeBackend {
    fn with_hospitals(count: usize) -> Self {
        let backend = FakeBackend::default();
        *backend.records.lock().unwrap() = (1..=count).map(hospital).collect();
        backend
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail_with(&self, err: RequestError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    /// Only the list and statistics reads fail.
    fn fail_reads_with(&self, err: RequestError) {
        *self.read_failure.lock().unwrap() = Some(err);
    }

    fn wipe(&self) {
        self.records.lock().unwrap().clear();
    }

    fn snapshot(&self) -> Vec<HospitalRecord> {
        self.records.lock().unwrap().clone()
    }

    fn enter(&self) -> Result<(), RequestError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn enter_read(&self) -> Result<(), RequestError> {
        self.enter()?;
        match self.read_failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn missing(id: &str) -> RequestError {
        RequestError::Status {
            status: 404,
            message: format!("Hospital {id} not found"),
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn list(&self) -> Result<Vec<HospitalRecord>, RequestError> {
        self.enter_read()?;
        Ok(self.snapshot())
    }

    async fn fetch(&self, id: &str) -> Result<HospitalRecord, RequestError> {
        self.enter()?;
        self.snapshot()
            .into_iter()
            .find(|r| r.id.as_deref() == Some(id))
            .ok_or_else(|| RequestError::NotFound { id: id.to_string() })
    }

    async fn create(&self, record: &HospitalRecord) -> Result<Value, RequestError> {
        self.enter()?;
        let mut records = self.records.lock().unwrap();
        let mut record = record.clone();
        let id = record
            .id
            .clone()
            .unwrap_or_else(|| format!("HOSP_{:04}", records.len() + 1));
        record.id = Some(id.clone());
        records.push(record);
        Ok(json!({"message": "Hospital created successfully", "id": id}))
    }

    async fn update(&self, id: &str, record: &HospitalRecord) -> Result<Value, RequestError> {
        self.enter()?;
        let mut records = self.records.lock().unwrap();
        let slot = records
            .iter_mut()
            .find(|r| r.id.as_deref() == Some(id))
            .ok_or_else(|| FakeBackend::missing(id))?;
        *slot = HospitalRecord {
            id: Some(id.to_string()),
            ..record.clone()
        };
        Ok(json!({"message": "Hospital updated successfully"}))
    }

    async fn delete(&self, id: &str) -> Result<Value, RequestError> {
        self.enter()?;
        let mut records = self.records.lock().unwrap();
        let before = records.len();
        records.retain(|r| r.id.as_deref() != Some(id));
        if records.len() == before {
            return Err(FakeBackend::missing(id));
        }
        Ok(json!({"message": "Hospital deleted successfully"}))
    }

    async fn search(&self, filters: &SearchFilters) -> Result<Vec<HospitalRecord>, RequestError> {
        self.enter()?;
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|r| {
                contains(&r.region, &filters.region)
                    && contains(&r.delegation, &filters.delegation)
                    && contains(&r.commune, &filters.commune)
                    && contains(&r.category, &filters.category)
                    && contains(&r.name, &filters.name)
            })
            .collect())
    }

    async fn statistics(&self) -> Result<Statistics, RequestError> {
        self.enter_read()?;
        let records = self.snapshot();
        Ok(Statistics {
            total_hospitals: records.len() as u64,
            regions: counts(records.iter().map(|r| r.display_region())),
            delegations: counts(records.iter().map(|r| r.display_delegation())),
            categories: counts(records.iter().map(|r| r.display_category())),
            communes: counts(records.iter().map(|r| r.display_commune())),
        })
    }

    async fn upload(&self, _file_name: &str, contents: Vec<u8>) -> Result<Value, RequestError> {
        self.enter()?;
        let bad_request = |message: String| RequestError::Status {
            status: 400,
            message,
        };
        let body: Value =
            serde_json::from_slice(&contents).map_err(|e| bad_request(e.to_string()))?;
        let records = model::records_from_value(body).map_err(|e| bad_request(e.to_string()))?;
        let count = records.len();
        *self.records.lock().unwrap() = records;
        Ok(json!({
            "message": format!("Data loaded successfully! {count} hospitals imported.")
        }))
    }

    async fn create_sample(&self) -> Result<Value, RequestError> {
        self.enter()?;
        *self.records.lock().unwrap() = (1..=3).map(hospital).collect();
        Ok(json!({"message": "Sample data created successfully!"}))
    }

    async fn export(&self) -> Result<Value, RequestError> {
        self.enter()?;
        serde_json::to_value(self.snapshot()).map_err(|e| RequestError::Decode {
            message: e.to_string(),
        })
    }
}

fn app_with(count: usize) -> App<FakeBackend, Vec<Alert>> {
    App::new(FakeBackend::with_hospitals(count), Vec::new())
}

fn export_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 14).unwrap()
}

fn fill_new_hospital(app: &mut App<FakeBackend, Vec<Alert>>) {
    app.set_fields(&[
        (FormField::Name, "Hôpital Provincial Taza".to_string()),
        (FormField::Region, "Fès-Meknès".to_string()),
        (FormField::Delegation, "Taza".to_string()),
        (FormField::Commune, "Taza".to_string()),
        (FormField::Category, "Hôpital Provincial".to_string()),
    ])
    .unwrap();
}

#[tokio::test]
async fn twenty_five_records_walk_three_pages() {
    let mut app = app_with(25);
    app.load().await.unwrap();

    let info = app.store().page_info();
    assert_eq!(info.label(), "1-10 sur 25");
    assert!(!info.has_previous);
    assert!(info.has_next);
    assert_eq!(app.store().visible()[0].display_id(), "HOSP_0001");
    assert_eq!(app.store().visible().len(), 10);

    assert!(app.next_page());
    assert!(app.next_page());
    assert!(!app.next_page());

    let info = app.store().page_info();
    assert_eq!(app.store().current_page(), 3);
    assert_eq!(info.label(), "21-25 sur 25");
    assert!(!info.has_next);
    assert!(info.has_previous);
    assert_eq!(app.store().visible().len(), 5);
    assert_eq!(app.store().visible()[0].display_id(), "HOSP_0021");
}

#[tokio::test]
async fn out_of_range_page_is_a_silent_no_op() {
    let mut app = app_with(25);
    app.load().await.unwrap();
    assert!(!app.go_to_page(0));
    assert!(!app.go_to_page(4));
    assert_eq!(app.store().current_page(), 1);
    assert!(app.go_to_page(3));
    assert!(app.alerts().is_empty());
}

#[tokio::test]
async fn clear_then_load_matches_single_load() {
    let mut once = app_with(12);
    once.load().await.unwrap();

    let mut app = app_with(12);
    app.search(SearchFilters {
        category: "CHU".to_string(),
        ..Default::default()
    })
    .await
    .unwrap();
    assert_eq!(app.store().len(), 4);
    app.next_page();

    app.clear().await.unwrap();
    app.load().await.unwrap();
    assert!(app.filters().is_empty());
    assert_eq!(app.store().records(), once.store().records());
    assert_eq!(app.store().current_page(), 1);
}

#[tokio::test]
async fn empty_result_set_renders_placeholder_row() {
    let mut app = app_with(5);
    app.search(SearchFilters {
        name: "Introuvable".to_string(),
        ..Default::default()
    })
    .await
    .unwrap();

    let info = app.store().page_info();
    assert_eq!(info.label(), "0-0 sur 0");
    assert!(!info.has_previous && !info.has_next);
    let text = app.table_text(false);
    assert_eq!(text.matches(NO_RESULTS).count(), 1);
}

#[tokio::test]
async fn failed_load_keeps_previous_result_set() {
    let mut app = app_with(25);
    app.load().await.unwrap();
    app.go_to_page(2);

    app.backend().fail_with(RequestError::Transport {
        message: "connection refused".to_string(),
    });
    let err = app.load().await.unwrap_err();
    assert!(matches!(err, AppError::Request { .. }));

    assert_eq!(app.store().len(), 25);
    assert_eq!(app.store().current_page(), 2);
    assert_eq!(app.alerts().as_slice(), &[Alert::error("connection refused")]);
    assert!(!app.loading().is_visible());
}

#[tokio::test]
async fn export_then_import_restores_result_set() {
    let dir = tempfile::tempdir().unwrap();
    let mut app = app_with(7);
    app.load().await.unwrap();
    let before = app.store().records().to_vec();

    let path = app.export(dir.path(), export_date()).await.unwrap();
    assert_eq!(
        path.file_name().unwrap().to_string_lossy(),
        "moroccan_hospitals_2024-05-14.json"
    );
    assert!(std::fs::read_to_string(&path).unwrap().contains("\n  {"));

    app.backend().wipe();
    app.load().await.unwrap();
    assert!(app.store().is_empty());

    app.import(&path).await.unwrap();
    assert_eq!(app.store().records(), before.as_slice());
    assert_eq!(app.statistics().counters().total_hospitals, 7);
    assert_eq!(
        app.alerts().as_slice(),
        &[
            Alert::success("Données exportées avec succès!"),
            Alert::success("Data loaded successfully! 7 hospitals imported."),
        ]
    );
}

#[tokio::test]
async fn non_json_import_never_reaches_backend() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("data.csv");
    std::fs::write(&csv, "id,name\n1,x\n").unwrap();

    let mut app = app_with(3);
    app.load().await.unwrap();
    let calls = app.backend().calls();
    let before = app.store().records().to_vec();

    let err = app.import(&csv).await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Transfer {
            source: TransferError::NotJson { .. }
        }
    ));
    assert_eq!(app.backend().calls(), calls);
    assert_eq!(app.store().records(), before.as_slice());
    assert_eq!(
        app.alerts().as_slice(),
        &[Alert::danger("Veuillez sélectionner un fichier JSON valide.")]
    );
}

#[tokio::test]
async fn upload_transport_failure_uses_generic_message() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("hospitals.json");
    std::fs::write(&file, "[]").unwrap();

    let mut app = app_with(2);
    app.backend().fail_with(RequestError::Transport {
        message: "broken pipe".to_string(),
    });
    assert!(app.import(&file).await.is_err());
    assert_eq!(
        app.alerts().as_slice(),
        &[Alert::danger("Erreur lors du chargement du fichier.")]
    );
    assert_eq!(
        app.alerts()[0].render(false),
        "[DANGER] Erreur lors du chargement du fichier."
    );
}

#[tokio::test]
async fn failed_validation_makes_no_backend_call() {
    let mut app = app_with(0);
    app.show_create();
    app.set_field(FormField::Name, "Hôpital sans région").unwrap();

    let err = app.save().await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Form {
            source: FormError::Invalid { .. }
        }
    ));
    assert_eq!(app.backend().calls(), 0);

    let form = app.forms().form().unwrap();
    assert!(form.was_validated());
    assert!(form.error_for(FormField::Region).is_some());
    assert!(form.error_for(FormField::Name).is_none());
    assert_eq!(form.fields().name, "Hôpital sans région");
    assert_eq!(app.alerts().len(), 1);
    assert_eq!(app.alerts()[0].level, AlertLevel::Danger);
}

#[tokio::test]
async fn create_closes_form_and_refreshes() {
    let mut app = app_with(10);
    app.load().await.unwrap();
    app.show_create();
    fill_new_hospital(&mut app);

    app.save().await.unwrap();
    assert!(!app.forms().is_open());
    assert_eq!(app.store().len(), 11);
    assert_eq!(app.store().total_pages(), 2);
    assert_eq!(app.statistics().counters().total_hospitals, 11);
    assert_eq!(
        app.alerts().as_slice(),
        &[Alert::success("Hôpital ajouté avec succès!")]
    );
    let created = &app.store().records()[10];
    assert_eq!(created.display_id(), "HOSP_0011");
    assert_eq!(created.display_commune(), "Taza");
}

#[tokio::test]
async fn edit_keeps_unchanged_fields() {
    let mut app = app_with(3);
    app.edit("HOSP_0002").await.unwrap();
    assert!(matches!(
        app.forms().form().unwrap().intent(),
        ModalIntent::Edit { id } if id == "HOSP_0002"
    ));
    app.set_field(FormField::Commune, "Salé").unwrap();
    app.save().await.unwrap();

    let updated = app.backend().fetch("HOSP_0002").await.unwrap();
    assert_eq!(updated.display_commune(), "Salé");
    assert_eq!(updated.display_name(), "Hôpital 2");
    assert_eq!(
        app.alerts().as_slice(),
        &[Alert::success("Hôpital modifié avec succès!")]
    );
}

#[tokio::test]
async fn view_is_read_only() {
    let mut app = app_with(3);
    app.view("HOSP_0003").await.unwrap();
    let err = app.set_field(FormField::Name, "x").unwrap_err();
    assert!(matches!(
        err,
        AppError::Form {
            source: FormError::ReadOnly
        }
    ));
    let calls = app.backend().calls();
    assert!(app.save().await.is_err());
    assert_eq!(app.backend().calls(), calls);
    assert_eq!(app.forms().form().unwrap().fields().name, "Hôpital 3");
}

#[tokio::test]
async fn unknown_id_alerts_not_found() {
    let mut app = app_with(1);
    assert!(app.view("HOSP_9999").await.is_err());
    assert!(!app.forms().is_open());
    assert_eq!(app.alerts().as_slice(), &[Alert::error("Hospital not found")]);
}

#[tokio::test]
async fn delete_waits_for_confirmation() {
    let mut app = app_with(4);
    app.delete("HOSP_0001");
    assert_eq!(app.forms().pending_delete(), Some("HOSP_0001"));
    app.cancel();
    assert_eq!(app.backend().calls(), 0);
    assert!(app.confirm_delete().await.is_err());
    assert_eq!(app.backend().calls(), 0);

    app.delete("HOSP_0001");
    app.confirm_delete().await.unwrap();
    assert!(!app.forms().is_open());
    assert_eq!(app.store().len(), 3);
    assert_eq!(
        app.alerts().last(),
        Some(&Alert::success("Hôpital supprimé avec succès!"))
    );
}

#[tokio::test]
async fn failed_delete_keeps_confirmation_open() {
    let mut app = app_with(1);
    app.delete("HOSP_0042");
    assert!(app.confirm_delete().await.is_err());
    assert_eq!(app.forms().pending_delete(), Some("HOSP_0042"));
    assert_eq!(
        app.alerts().as_slice(),
        &[Alert::error("Hospital HOSP_0042 not found")]
    );
}

#[tokio::test]
async fn sample_data_replaces_directory() {
    let mut app = app_with(0);
    app.create_sample().await.unwrap();
    assert_eq!(app.store().len(), 3);
    assert_eq!(app.statistics().counters().total_hospitals, 3);
    assert_eq!(
        app.alerts().as_slice(),
        &[Alert::success("Sample data created successfully!")]
    );
}

#[tokio::test]
async fn statistics_redraw_destroys_one_chart_per_slot() {
    let mut app = app_with(9);
    app.load_statistics().await.unwrap();
    app.load_statistics().await.unwrap();

    let stats = app.statistics();
    for slot in [stats.region_slot(), stats.category_slot()] {
        assert_eq!(slot.destroyed(), 1);
        assert_eq!(slot.live(), 1);
    }
    assert_eq!(stats.counters().regions, 3);
    assert_eq!(stats.counters().categories, 3);
    assert!(app.statistics_text(false).contains("Hôpitaux: 9"));
}

#[tokio::test]
async fn mutation_succeeds_even_if_refresh_fails() {
    let mut app = app_with(2);
    app.load().await.unwrap();
    app.show_create();
    fill_new_hospital(&mut app);
    app.backend().fail_reads_with(RequestError::Transport {
        message: "connection reset".to_string(),
    });

    app.save().await.unwrap();
    assert!(!app.forms().is_open());
    assert_eq!(app.backend().snapshot().len(), 3);
    assert_eq!(app.store().len(), 2);
    assert_eq!(
        app.alerts().as_slice(),
        &[
            Alert::success("Hôpital ajouté avec succès!"),
            Alert::error("connection reset"),
            Alert::error("connection reset"),
        ]
    );
}

#[tokio::test]
async fn update_404_surfaces_once_and_keeps_form() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/hospitals/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_id": "42",
            "nom_etablissement": "Hôpital Hassan II",
            "region": "Souss-Massa",
            "delegation": "Agadir-Ida-Outanane",
            "commune": "Agadir",
            "categorie": "CHR"
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/hospitals/42"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri()).unwrap();
    let mut app = App::new(client, Vec::<Alert>::new());
    app.edit("42").await.unwrap();
    app.set_field(FormField::Commune, "Inezgane").unwrap();

    let err = app.save().await.unwrap_err();
    assert!(matches!(err, AppError::Request { .. }));
    assert_eq!(app.alerts().as_slice(), &[Alert::error("not found")]);
    assert_eq!(app.alerts()[0].render(false), "[DANGER] Error: not found");

    let form = app.forms().form().unwrap();
    assert_eq!(form.fields().commune, "Inezgane");
    assert!(matches!(form.intent(), ModalIntent::Edit { .. }));
    assert!(!app.loading().is_visible());
}

#[tokio::test]
async fn unstructured_error_body_uses_status_line() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/hospitals"))
        .respond_with(ResponseTemplate::new(500).set_body_string("<h1>Internal Server Error</h1>"))
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri()).unwrap();
    let mut app = App::new(client, Vec::<Alert>::new());
    assert!(app.load().await.is_err());
    assert_eq!(
        app.alerts().as_slice(),
        &[Alert::error("HTTP error! status: 500")]
    );
}

#[tokio::test]
async fn html_success_body_keeps_previous_result_set() {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/hospitals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"_id": "A"}, {"_id": "B"}])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/hospitals"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login page</html>"))
        .mount(&server)
        .await;

    let client = ApiClient::new(&server.uri()).unwrap();
    let mut app = App::new(client, Vec::<Alert>::new());
    app.load().await.unwrap();
    assert_eq!(app.store().len(), 2);

    assert!(app.load().await.is_err());
    assert_eq!(app.store().len(), 2);
    assert_eq!(app.store().records()[1].display_id(), "B");
    assert_eq!(app.alerts().len(), 1);
    assert_eq!(app.alerts()[0].level, AlertLevel::Error);
    assert!(app.alerts()[0].message.starts_with("unexpected response body"));
}

#[tokio::test]
async fn exported_file_lists_records_in_backend_order() {
    let dir = tempfile::tempdir().unwrap();
    let body = json!([{"_id": "B", "nom_etablissement": "x"}, {"_id": "A"}]);
    let path = transfer::write_export(dir.path(), export_date(), &body)
        .await
        .unwrap();
    let written: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    let records = model::records_from_value(written).unwrap();
    assert_eq!(records[0].display_id(), "B");
    assert_eq!(records[1].display_name(), "N/A");
}
