//! Integration tests for file upload preview and append.

mod common;

use axum::http::StatusCode;
use common::TestClient;

const AUGUST_CSV: &[u8] = b"Referred Person,Referral Source,Referral Date\n\
Ann Lee,Dr. Patel,2025-08-04\n\
Bo Chan,,2025-08-05\n\
Cy Diaz,Google,08/13/2025\n\
Di Evans,Dr. Patel,not a date\n";

#[tokio::test]
async fn test_preview_lists_columns_rows_and_month_conversion() {
    let client = TestClient::new();
    let (status, body) = client
        .post_upload(
            "/api/import/preview",
            "august.csv",
            AUGUST_CSV,
            &[("month_column", "Referral Date")],
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["sheets"], serde_json::json!(["CSV"]));
    assert_eq!(body["sheet"], "CSV");
    assert_eq!(body["columns"][1], "Referral Source");
    assert_eq!(body["row_count"], 4);
    assert_eq!(body["rows"][1][1], "");

    let preview = body["month_preview"].as_array().unwrap();
    assert_eq!(preview.len(), 4);
    assert_eq!(preview[0]["month"], "2025-08");
    assert_eq!(preview[2]["month"], "2025-08");
    assert!(preview[3]["month"].is_null());
    assert_eq!(preview[3]["raw"], "not a date");

    assert!(client.ledger_rows().await.is_empty());
}

#[tokio::test]
async fn test_upload_append_with_month_column() {
    let client = TestClient::new();
    let (status, body) = client
        .post_upload(
            "/api/import/append",
            "august.csv",
            AUGUST_CSV,
            &[
                ("person_column", "Referred Person"),
                ("source_column", "Referral Source"),
                ("month_mode", "column"),
                ("month_column", "Referral Date"),
            ],
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["rejected"], 2);

    let rows = client.ledger_rows().await;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["referral_source"], "Dr. Patel");
    assert_eq!(rows[1]["referred_person"], "Cy Diaz");
}

#[tokio::test]
async fn test_upload_append_with_fixed_month() {
    let client = TestClient::new();
    let (status, body) = client
        .post_upload(
            "/api/import/append",
            "august.csv",
            AUGUST_CSV,
            &[
                ("person_column", "Referred Person"),
                ("source_column", "Referral Source"),
                ("month_mode", "fixed"),
                ("month", "2024-12"),
            ],
        )
        .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["accepted"], 3);
    assert_eq!(body["rejected"], 1);
    assert!(client
        .ledger_rows()
        .await
        .iter()
        .all(|r| r["month"] == "2024-12"));
}

#[tokio::test]
async fn test_upload_append_requires_mapping() {
    let client = TestClient::new();
    let (status, body) = client
        .post_upload(
            "/api/import/append",
            "august.csv",
            AUGUST_CSV,
            &[("source_column", "Referral Source"), ("month", "2024-12")],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("person_column"));
}

#[tokio::test]
async fn test_upload_unknown_sheet_is_rejected() {
    let client = TestClient::new();
    let (status, _) = client
        .post_upload(
            "/api/import/preview",
            "august.csv",
            AUGUST_CSV,
            &[("sheet", "Sheet2")],
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_empty_upload_is_rejected() {
    let client = TestClient::new();
    let (status, body) = client
        .post_upload("/api/import/preview", "empty.csv", b"", &[])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file uploaded");
}

#[tokio::test]
async fn test_corrupt_workbook_is_rejected() {
    let client = TestClient::new();
    let (status, _) = client
        .post_upload("/api/import/preview", "referrals.xlsx", b"not a workbook", &[])
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_duplicate_headers_are_disambiguated() {
    let client = TestClient::new();
    let csv = b"Name,Source,Source,\nAnn,Clinic,Web,x\n";
    let (status, body) = client
        .post_upload("/api/import/preview", "dupes.csv", csv, &[])
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["columns"],
        serde_json::json!(["Name", "Source", "Source.1", "Unnamed: 3"])
    );
    assert!(body["month_preview"].is_null());
}
