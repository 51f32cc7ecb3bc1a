//! FILENAME: tests/test_data_actions.rs
//! Integration tests for loading, paging, sorting, filtering and searching.

mod common;

use common::{record, EmployeeFixture, TestHarness};
use datagrid::{ActionOutcome, FilterOperator, GridEvent, GridSettings, PredicateLogic, SortDirection};
use serde_json::json;

// ============================================================================
// LOADING
// ============================================================================

#[tokio::test]
async fn test_single_record_loads_without_correction() {
    let mut harness = TestHarness::employees(1, 12);
    let outcome = harness.grid.load().await.unwrap();

    assert_eq!(outcome, ActionOutcome::Committed);
    assert_eq!(harness.grid.total_count(), 1);
    assert_eq!(harness.grid.current_page(), 1);
    assert_eq!(harness.source.queries(), 1);
    assert_eq!(harness.events.count(|e| matches!(e, GridEvent::PageChanged { .. })), 0);
    assert_eq!(harness.events.count(|e| matches!(e, GridEvent::RenderComplete)), 1);

    let rows = harness.grid.content_rows();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_data_row());
}

#[tokio::test]
async fn test_columns_generated_from_first_record() {
    let records = vec![record(json!({"sku": "A-1", "price": 9.5, "stock": 3}))];
    let mut harness = TestHarness::new(GridSettings::default(), records);
    harness.grid.load().await.unwrap();

    let fields: Vec<Option<String>> = harness.grid.columns().leaves.iter().map(|c| c.field.clone()).collect();
    assert_eq!(
        fields,
        vec![Some("sku".to_string()), Some("price".to_string()), Some("stock".to_string())]
    );
    assert!(harness.grid.columns().types_inferred());
}

#[tokio::test]
async fn test_vetoed_load_keeps_grid_empty() {
    let mut harness = TestHarness::employees(5, 12);
    harness.events.veto_when(|_| true);

    let outcome = harness.grid.load().await.unwrap();
    assert_eq!(outcome, ActionOutcome::Canceled);
    assert!(!harness.grid.pipeline().is_loaded());
    assert_eq!(harness.source.queries(), 0);
}

// ============================================================================
// PAGING
// ============================================================================

#[tokio::test]
async fn test_paging_moves_between_pages() {
    let mut harness = TestHarness::loaded_employees(12, 5).await;
    assert_eq!(harness.grid.pipeline().total_pages(), 3);

    assert_eq!(harness.grid.go_to_page(3).await.unwrap(), ActionOutcome::Committed);
    assert_eq!(harness.grid.records().len(), 2);
    assert_eq!(harness.grid.records()[0]["id"], json!(11));

    // Out of range and current page are no-ops
    assert_eq!(harness.grid.go_to_page(4).await.unwrap(), ActionOutcome::Ignored);
    assert_eq!(harness.grid.go_to_page(3).await.unwrap(), ActionOutcome::Ignored);
    assert_eq!(harness.grid.go_to_page(0).await.unwrap(), ActionOutcome::Ignored);
}

#[tokio::test]
async fn test_filter_past_last_page_redirects() {
    let mut harness = TestHarness::loaded_employees(20, 5).await;
    harness.grid.go_to_page(4).await.unwrap();
    harness.events.clear();

    // Sales: ids 1, 4, 7, 10, 13, 16, 19
    let outcome = harness
        .grid
        .filter_by_column("department", FilterOperator::Equal, json!("Sales"))
        .await
        .unwrap();

    assert_eq!(outcome, ActionOutcome::Committed);
    assert_eq!(harness.grid.total_count(), 7);
    assert_eq!(harness.grid.current_page(), 2);
    let ids: Vec<_> = harness.grid.records().iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(16), json!(19)]);
    assert_eq!(
        harness.events.count(|e| matches!(
            e,
            GridEvent::PageChanged { current_page: 2, previous_page: 4 }
        )),
        1
    );
    assert_eq!(harness.events.count(|e| matches!(e, GridEvent::Filtered { .. })), 1);
}

#[tokio::test]
async fn test_filter_to_nothing_keeps_page() {
    let mut harness = TestHarness::loaded_employees(20, 5).await;
    harness.grid.go_to_page(2).await.unwrap();

    harness
        .grid
        .filter_by_column("name", FilterOperator::Equal, json!("Nobody"))
        .await
        .unwrap();

    assert_eq!(harness.grid.total_count(), 0);
    assert_eq!(harness.grid.current_page(), 2);
    let rows = harness.grid.content_rows();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].is_empty_row);
    assert!(!rows[0].is_data_row());
}

#[tokio::test]
async fn test_failed_queries_keep_committed_state() {
    let mut harness = TestHarness::loaded_employees(12, 5).await;
    harness.source.fail_queries(true);

    assert!(harness.grid.go_to_page(2).await.is_err());
    assert!(harness
        .grid
        .filter_by_column("name", FilterOperator::Equal, json!("E3"))
        .await
        .is_err());
    assert_eq!(harness.events.count(|e| matches!(e, GridEvent::Error { .. })), 2);

    assert_eq!(harness.grid.current_page(), 1);
    assert!(harness.grid.pipeline().filters().is_empty());
    assert_eq!(harness.grid.records()[0]["id"], json!(1));

    // Refresh replays the committed query, not the failed one
    harness.source.fail_queries(false);
    harness.grid.refresh().await.unwrap();
    assert_eq!(harness.grid.current_page(), 1);
    assert_eq!(harness.grid.total_count(), 12);
    assert_eq!(harness.grid.go_to_page(2).await.unwrap(), ActionOutcome::Committed);
    assert_eq!(harness.grid.records()[0]["id"], json!(6));
}

// ============================================================================
// SORT / FILTER / SEARCH
// ============================================================================

#[tokio::test]
async fn test_sort_and_clear() {
    let mut harness = TestHarness::loaded_employees(6, 12).await;

    harness
        .grid
        .sort_by_column("age", SortDirection::Descending, false)
        .await
        .unwrap();
    assert_eq!(harness.grid.records()[0]["id"], json!(6));

    harness.grid.sort_by_column("department", SortDirection::Ascending, true).await.unwrap();
    assert_eq!(harness.grid.pipeline().sorts().len(), 2);

    harness.grid.remove_sort_column("age").await.unwrap();
    assert_eq!(harness.grid.pipeline().sorts().len(), 1);
    // Research: 3, 6; stable within the key
    assert_eq!(harness.grid.records()[0]["id"], json!(3));

    harness.grid.clear_sort().await.unwrap();
    assert!(harness.grid.pipeline().sorts().is_empty());
    assert_eq!(harness.grid.records()[0]["id"], json!(1));
}

#[tokio::test]
async fn test_or_filters_join_and_clear() {
    let mut harness = TestHarness::loaded_employees(9, 12).await;

    harness
        .grid
        .filter_by_column("department", FilterOperator::Equal, json!("Sales"))
        .await
        .unwrap();
    harness
        .grid
        .filter_by_column_with(
            "department",
            FilterOperator::Equal,
            json!("Support"),
            PredicateLogic::Or,
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(harness.grid.total_count(), 6);

    harness.grid.remove_filtered_cols_by_field("department").await.unwrap();
    assert!(harness.grid.pipeline().filters().is_empty());
    assert_eq!(harness.grid.total_count(), 9);

    assert_eq!(harness.grid.clear_filter(&[]).await.unwrap(), ActionOutcome::Ignored);
}

#[tokio::test]
async fn test_search_across_columns() {
    let mut harness = TestHarness::loaded_employees(12, 20).await;

    harness.grid.search("employee 1").await.unwrap();
    // 1, 10, 11, 12
    assert_eq!(harness.grid.total_count(), 4);
    assert_eq!(harness.grid.pipeline().search_key(), "employee 1");

    assert_eq!(harness.grid.search("employee 1").await.unwrap(), ActionOutcome::Ignored);
    harness.grid.search("").await.unwrap();
    assert_eq!(harness.grid.total_count(), 12);
}

#[tokio::test]
async fn test_selection_cleared_by_new_page() {
    let mut harness = TestHarness::loaded_employees(10, 5).await;
    // Single mode keeps the last in-range index
    harness.grid.select_rows(&[0, 2, 9]);
    assert_eq!(harness.grid.selected_row_indexes(), vec![2]);

    harness.grid.go_to_page(2).await.unwrap();
    assert!(harness.grid.selected_row_indexes().is_empty());

    harness.grid.select_row(1, false);
    assert_eq!(harness.grid.selected_records()[0]["id"], json!(7));
}

#[tokio::test]
async fn test_settings_document_drives_grid() {
    let settings = GridSettings::from_json(
        r#"{
            "columns": [
                {"field": "id", "headerText": "ID", "isPrimaryKey": true},
                {"field": "name", "headerText": "Name"}
            ],
            "pageSettings": {"enabled": true, "pageSize": 2, "currentPage": 2},
            "sortSettings": {"columns": [{"field": "id", "direction": "Descending"}]}
        }"#,
    )
    .unwrap();
    let mut harness = TestHarness::new(settings, EmployeeFixture::records(5));
    harness.grid.load().await.unwrap();

    assert_eq!(harness.grid.current_page(), 2);
    let ids: Vec<_> = harness.grid.records().iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec![json!(3), json!(2)]);
}
