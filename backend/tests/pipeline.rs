//! End-to-end: CSV text → job → validation → script / execution → history.

use std::sync::Mutex;

use sheetload::{
    compile, parse_bytes_auto, preview, validate, ColumnType, EndpointError, FixedColumn,
    HistoryStore, JobConfig, JsonHistoryStore, OperationType, StatementEndpoint,
};

const CSV: &str = "Código;Nome do Cliente;Saldo;Ativo\n\
                   C-1;Ana;10,50;sim\n\
                   C-2;O'Brien;abc;não\n\
                   ;Sem código;1;1\n\
                   C-1;Ana (dup);2;talvez\n";

fn update_job(columns: &[String]) -> JobConfig {
    let mut job = JobConfig::for_columns("clientes", OperationType::Update, columns);
    job.mappings.set_key("Código").unwrap();
    job.mappings.set_type("Saldo", ColumnType::Number).unwrap();
    job.mappings.set_type("Ativo", ColumnType::Boolean).unwrap();
    job.fixed_columns.push(FixedColumn::new("origem", "planilha"));
    job
}

#[test]
fn test_csv_to_update_script() {
    let sheet = parse_bytes_auto(CSV.as_bytes()).unwrap();
    assert_eq!(sheet.delimiter, ';');
    assert_eq!(sheet.rows.len(), 4);

    let job = update_job(&sheet.columns);

    let report = validate(&sheet.rows, &job.mappings);
    assert!(!report.is_valid);
    let error_rows: Vec<_> = report.errors.iter().map(|e| e.sheet_row()).collect();
    // non-numeric balance on sheet row 3, empty key on sheet row 4
    assert_eq!(error_rows, vec![Some(3), Some(4)]);
    assert_eq!(report.warnings.len(), 2);

    let script = compile(&sheet.rows, &job).unwrap();
    assert_eq!(script.skipped_rows, 1);
    assert_eq!(script.statements.len(), 3);
    assert_eq!(
        script.statements[0],
        "UPDATE clientes SET nome_do_cliente = 'Ana', saldo = 10.50, ativo = TRUE, origem = 'planilha' WHERE código = 'C-1';\n"
    );
    assert!(script.statements[1].contains("nome_do_cliente = 'O''Brien', saldo = 'abc', ativo = FALSE"));
    assert!(script.statements[2].contains("ativo = NULL"));

    let rendered = script.render();
    assert!(rendered.starts_with("-- 1 row(s) skipped: empty key value\n"));
    assert_eq!(rendered.matches(";\n").count(), 3);
}

#[test]
fn test_csv_to_insert_script_with_codes() {
    let sheet = parse_bytes_auto(CSV.as_bytes()).unwrap();
    let mut job = JobConfig::for_columns("clientes", OperationType::Insert, &sheet.columns);
    job.forced_string_columns.insert("Código".to_string());

    let script = compile(&sheet.rows, &job).unwrap();
    assert_eq!(script.statements.len(), 4);
    assert!(script.statements[0].starts_with(
        "INSERT INTO clientes (codigo, código, nome_do_cliente, saldo, ativo) VALUES ('000001', 'C-1',"
    ));
    assert!(script.statements[2].contains("VALUES ('000003', NULL, 'Sem código'"));

    let head = preview(&sheet.rows, &job, 2).unwrap();
    assert_eq!(head.script.statements[..], script.statements[..2]);
    assert!(head.render().ends_with("-- ... 2 more row(s)\n"));
}

#[test]
fn test_job_file_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("job.json");

    let sheet = parse_bytes_auto(CSV.as_bytes()).unwrap();
    let job = update_job(&sheet.columns);
    std::fs::write(&path, job.to_json().unwrap()).unwrap();

    let loaded = JobConfig::from_file(&path).unwrap();
    assert_eq!(loaded, job);
    assert_eq!(compile(&sheet.rows, &loaded), compile(&sheet.rows, &job));
}

/// Fails any statement mentioning O'Brien.
#[derive(Default)]
struct FlakyEndpoint {
    seen: Mutex<Vec<String>>,
}

impl StatementEndpoint for FlakyEndpoint {
    async fn submit(&self, sql: &str) -> Result<(), EndpointError> {
        self.seen.lock().unwrap().push(sql.to_string());
        if sql.contains("O''Brien") {
            Err(EndpointError::Rejected("invalid input syntax for type numeric: \"abc\"".into()))
        } else {
            Ok(())
        }
    }
}

#[tokio::test]
async fn test_execute_records_history() {
    let dir = tempfile::tempdir().unwrap();
    let sheet = parse_bytes_auto(CSV.as_bytes()).unwrap();
    let job = update_job(&sheet.columns);
    let endpoint = FlakyEndpoint::default();

    let mut history = JsonHistoryStore::with_dir(dir.path());
    let summary = sheetload::execute(&endpoint, &mut history, &job, &sheet.rows, "clientes.csv")
        .await
        .unwrap();

    assert_eq!((summary.total, summary.succeeded, summary.failed), (4, 2, 2));
    let failed_rows: Vec<_> = summary.errors.iter().map(|f| f.row_index).collect();
    assert_eq!(failed_rows, vec![1, 2]);
    assert_eq!(endpoint.seen.lock().unwrap().len(), 3);

    let reopened = JsonHistoryStore::with_dir(dir.path());
    let records = reopened.recent(20).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].table_name, "clientes");
    assert_eq!(records[0].mappings, job.mappings);
    assert_eq!(records[0].errors.as_ref().map(Vec::len), Some(2));
}
