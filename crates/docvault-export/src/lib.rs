//! CSV exports derived from archive side-cars.
//!
//! Exports are pure functions of the side-car tree: walk the JSON
//! files, select the ones carrying a complete `accounting.expense`
//! block, and emit rows in a fixed column order sorted by
//! `(expense_date, document_id)`. Running twice against an unchanged
//! archive produces byte-identical output.

use camino::Utf8Path;
use docvault_sidecar::{ExpenseRecord, Sidecar};
use docvault_utils::error::ExportError;
use tracing::warn;
use walkdir::WalkDir;

/// Column order for `expenses.csv`.
pub const EXPENSES_CSV_COLUMNS: [&str; 17] = [
    "entity",
    "workflow",
    "expense_date",
    "vendor",
    "total_amount",
    "currency",
    "document_id",
    "archive_path",
    "tax_amount",
    "invoice_number",
    "payment_method",
    "category",
    "cost_center",
    "memo",
    "source",
    "origin_id",
    "created_at",
];

/// Column order for the Xero bills CSV.
pub const XERO_BILLS_COLUMNS: [&str; 10] = [
    "ContactName",
    "InvoiceNumber",
    "InvoiceDate",
    "DueDate",
    "Description",
    "Quantity",
    "UnitAmount",
    "AccountCode",
    "TaxType",
    "Reference",
];

/// A side-car with expense data, paired with where it was found.
struct ExpenseSidecar {
    sidecar: Sidecar,
    expense: ExpenseRecord,
}

/// Walk `{base}[/{entity}]` collecting side-cars with complete expense
/// blocks. Incomplete blocks and unreadable files are skipped with a
/// warning.
fn find_expense_sidecars(base: &Utf8Path, entity: Option<&str>) -> Vec<ExpenseSidecar> {
    let search_root = match entity {
        Some(entity) => base.join(entity),
        None => base.to_owned(),
    };
    if !search_root.exists() {
        return Vec::new();
    }

    let mut found = Vec::new();
    for dir_entry in WalkDir::new(search_root.as_std_path())
        .into_iter()
        .filter_map(Result::ok)
    {
        if !dir_entry.file_type().is_file() {
            continue;
        }
        let path = dir_entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        // The indexes directory holds databases, not side-cars.
        if path.components().any(|c| c.as_os_str() == "indexes") {
            continue;
        }

        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to read side-car {}: {e}", path.display());
                continue;
            }
        };
        let Ok(sidecar) = Sidecar::from_json(&text) else {
            continue;
        };
        let Some(expense) = sidecar
            .accounting
            .as_ref()
            .and_then(|a| a.expense.clone())
        else {
            continue;
        };
        if !expense.is_complete() {
            warn!(
                "skipping {}: accounting.expense is missing required fields",
                path.display()
            );
            continue;
        }
        found.push(ExpenseSidecar { sidecar, expense });
    }
    found
}

/// Export `expenses.csv`. Returns the number of rows written.
pub fn export_expenses_csv(
    base: &Utf8Path,
    output: &Utf8Path,
    entity: Option<&str>,
) -> Result<usize, ExportError> {
    let mut rows: Vec<[String; 17]> = find_expense_sidecars(base, entity)
        .into_iter()
        .map(|found| expense_row(&found))
        .collect();
    // (expense_date, document_id) keeps output stable across runs.
    rows.sort_by(|a, b| (&a[2], &a[6]).cmp(&(&b[2], &b[6])));

    let mut writer = csv::Writer::from_path(output.as_std_path())
        .map_err(|e| ExportError::Csv(e.to_string()))?;
    writer
        .write_record(EXPENSES_CSV_COLUMNS)
        .map_err(|e| ExportError::Csv(e.to_string()))?;
    for row in &rows {
        writer
            .write_record(row)
            .map_err(|e| ExportError::Csv(e.to_string()))?;
    }
    writer.flush()?;
    Ok(rows.len())
}

/// Export the Xero-compatible bills CSV. Returns the number of rows.
///
/// Traceability: `Reference` carries `archive:{document_id}` and
/// `Description` carries the archive path.
pub fn export_xero_csv(
    base: &Utf8Path,
    output: &Utf8Path,
    entity: Option<&str>,
) -> Result<usize, ExportError> {
    let mut rows: Vec<[String; 10]> = find_expense_sidecars(base, entity)
        .into_iter()
        .map(|found| xero_row(&found))
        .collect();
    // (InvoiceDate, Reference).
    rows.sort_by(|a, b| (&a[2], &a[9]).cmp(&(&b[2], &b[9])));

    let mut writer = csv::Writer::from_path(output.as_std_path())
        .map_err(|e| ExportError::Csv(e.to_string()))?;
    writer
        .write_record(XERO_BILLS_COLUMNS)
        .map_err(|e| ExportError::Csv(e.to_string()))?;
    for row in &rows {
        writer
            .write_record(row)
            .map_err(|e| ExportError::Csv(e.to_string()))?;
    }
    writer.flush()?;
    Ok(rows.len())
}

fn expense_row(found: &ExpenseSidecar) -> [String; 17] {
    let sidecar = &found.sidecar;
    let expense = &found.expense;
    let opt = |v: &Option<String>| v.clone().unwrap_or_default();
    [
        sidecar.entity.to_string(),
        sidecar
            .workflow
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default(),
        expense.expense_date.clone(),
        expense.vendor.clone(),
        expense.total_amount.clone(),
        expense.currency.clone(),
        sidecar.id.to_string(),
        expense.source_path.clone(),
        opt(&expense.tax_amount),
        opt(&expense.invoice_number),
        opt(&expense.payment_method),
        opt(&expense.category),
        opt(&expense.cost_center),
        opt(&expense.memo),
        sidecar.source.to_string(),
        sidecar.origin["message_id"].as_str().unwrap_or_default().to_string(),
        sidecar.created_at.to_rfc3339(),
    ]
}

fn xero_row(found: &ExpenseSidecar) -> [String; 10] {
    let expense = &found.expense;
    [
        expense.vendor.clone(),
        expense.invoice_number.clone().unwrap_or_default(),
        expense.expense_date.clone(),
        String::new(),
        format!("Archived: {}", expense.source_path),
        "1".to_string(),
        expense.total_amount.clone(),
        String::new(),
        String::new(),
        format!("archive:{}", found.sidecar.id),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use chrono::TimeZone;
    use docvault_sidecar::{Accounting, ContentMeta, IngestMeta, LlmemoryMeta};
    use docvault_utils::hash_bytes;
    use docvault_utils::types::{DocumentId, EntityName, SourceKind, WorkflowName};
    use serde_json::json;
    use tempfile::TempDir;

    fn write_expense_sidecar(
        base: &Utf8Path,
        entity: &str,
        name: &str,
        expense: ExpenseRecord,
    ) -> DocumentId {
        let dir = base.join(entity).join("docs").join("2025");
        std::fs::create_dir_all(&dir).unwrap();
        let content = format!("%PDF {name}");
        std::fs::write(dir.join(format!("{name}.pdf")), &content).unwrap();

        let ts = chrono::Utc.with_ymd_and_hms(2025, 12, 15, 10, 30, 0).unwrap();
        let hash = hash_bytes(content.as_bytes());
        let workflow = format!("{entity}-expense");
        let id = DocumentId::new(SourceKind::Mail, &workflow, ts, hash.clone());
        let sidecar = Sidecar {
            id: id.clone(),
            entity: EntityName::new(entity).unwrap(),
            source: SourceKind::Mail,
            workflow: Some(WorkflowName::new(&workflow).unwrap()),
            doc_type: "document".into(),
            subtype: Some("expense".into()),
            created_at: ts,
            content: ContentMeta {
                path: format!("{name}.pdf"),
                hash,
                size_bytes: content.len() as u64,
                mimetype: "application/pdf".into(),
                attachments: vec![],
            },
            origin: json!({"message_id": "<exp@x>", "from": "billing@vendor.com"}),
            tags: vec![],
            relationships: vec![],
            ingest: IngestMeta {
                connector: "mail@0.4.0".into(),
                ingested_at: ts,
                hostname: None,
                workflow_run_id: None,
            },
            llmemory: LlmemoryMeta::default(),
            accounting: Some(Accounting {
                expense: Some(expense),
            }),
        };
        std::fs::write(
            dir.join(format!("{name}.json")),
            sidecar.to_canonical_json().unwrap(),
        )
        .unwrap();
        id
    }

    fn sample_expense(date: &str, vendor: &str) -> ExpenseRecord {
        ExpenseRecord {
            expense_date: date.into(),
            vendor: vendor.into(),
            total_amount: "299.99".into(),
            currency: "USD".into(),
            invoice_number: Some("INV-12345".into()),
            source_path: "tsm/docs/2025/doc.pdf".into(),
            ..Default::default()
        }
    }

    fn base(dir: &TempDir) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()
    }

    #[test]
    fn exports_one_row_per_expense() {
        let dir = TempDir::new().unwrap();
        let base = base(&dir);
        let id = write_expense_sidecar(
            &base,
            "tsm",
            "2025-12-15-mail-a",
            sample_expense("2025-12-15", "ACME Vendor Inc"),
        );

        let out = base.join("expenses.csv");
        let count = export_expenses_csv(&base, &out, None).unwrap();
        assert_eq!(count, 1);

        let text = std::fs::read_to_string(&out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), EXPENSES_CSV_COLUMNS.join(","));
        let row = lines.next().unwrap();
        assert!(row.starts_with("tsm,tsm-expense,2025-12-15,ACME Vendor Inc,299.99,USD,"));
        assert!(row.contains(&id.to_string()));
        assert!(row.contains("tsm/docs/2025/doc.pdf"));
    }

    #[test]
    fn xero_rows_carry_traceability() {
        let dir = TempDir::new().unwrap();
        let base = base(&dir);
        let id = write_expense_sidecar(
            &base,
            "tsm",
            "2025-12-15-mail-a",
            sample_expense("2025-12-15", "ACME Vendor Inc"),
        );

        let out = base.join("xero.csv");
        let count = export_xero_csv(&base, &out, None).unwrap();
        assert_eq!(count, 1);

        let text = std::fs::read_to_string(&out).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.contains(&format!("archive:{id}")));
        assert!(row.contains("Archived: tsm/docs/2025/doc.pdf"));
        assert!(row.contains("ACME Vendor Inc"));
        assert!(row.contains("INV-12345"));
    }

    #[test]
    fn incomplete_expenses_are_skipped() {
        let dir = TempDir::new().unwrap();
        let base = base(&dir);
        let mut incomplete = sample_expense("2025-12-15", "ACME");
        incomplete.currency = String::new();
        write_expense_sidecar(&base, "tsm", "2025-12-15-mail-a", incomplete);

        let out = base.join("expenses.csv");
        assert_eq!(export_expenses_csv(&base, &out, None).unwrap(), 0);
        // Header only.
        assert_eq!(std::fs::read_to_string(&out).unwrap().lines().count(), 1);
    }

    #[test]
    fn entity_filter_restricts_walk() {
        let dir = TempDir::new().unwrap();
        let base = base(&dir);
        write_expense_sidecar(&base, "tsm", "2025-12-15-mail-a", sample_expense("2025-12-15", "A"));
        write_expense_sidecar(&base, "acme", "2025-12-15-mail-b", sample_expense("2025-12-15", "B"));

        let out = base.join("expenses.csv");
        assert_eq!(export_expenses_csv(&base, &out, Some("tsm")).unwrap(), 1);
        assert_eq!(export_expenses_csv(&base, &out, None).unwrap(), 2);
    }

    #[test]
    fn output_is_sorted_and_idempotent() {
        let dir = TempDir::new().unwrap();
        let base = base(&dir);
        write_expense_sidecar(&base, "tsm", "2025-12-20-mail-b", sample_expense("2025-12-20", "Later"));
        write_expense_sidecar(&base, "tsm", "2025-12-01-mail-a", sample_expense("2025-12-01", "Earlier"));

        let out1 = base.join("one.csv");
        let out2 = base.join("two.csv");
        export_expenses_csv(&base, &out1, None).unwrap();
        export_expenses_csv(&base, &out2, None).unwrap();

        let text1 = std::fs::read_to_string(&out1).unwrap();
        let text2 = std::fs::read_to_string(&out2).unwrap();
        assert_eq!(text1, text2);

        let rows: Vec<&str> = text1.lines().skip(1).collect();
        assert!(rows[0].contains("Earlier"));
        assert!(rows[1].contains("Later"));
    }
}
