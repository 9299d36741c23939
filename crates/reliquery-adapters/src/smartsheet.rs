//! `SheetSource` backed by the Smartsheet REST API.

use async_trait::async_trait;
use reliquery_core::{RowId, SheetId};
use reliquery_storage::ApiClient;
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, Instrument, Span};

use crate::{RowPayload, SheetError, SheetRow, SheetSource, SortCriterion};

#[derive(Debug, Clone)]
pub struct SmartsheetAdapter {
    http: ApiClient,
    sheet_id: SheetId,
}

#[derive(Debug, Deserialize)]
struct SheetBody {
    #[serde(default)]
    rows: Vec<SheetRow>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RowUpdate<'a> {
    id: RowId,
    #[serde(flatten)]
    row: &'a RowPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MoveRequest {
    row_ids: Vec<RowId>,
    to: MoveDestination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MoveDestination {
    sheet_id: SheetId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SortRequest<'a> {
    sort_criteria: &'a [SortCriterion],
}

impl SmartsheetAdapter {
    pub fn new(http: ApiClient, sheet_id: SheetId) -> Self {
        Self { http, sheet_id }
    }

    fn sheet_path(&self, suffix: &str) -> String {
        format!("sheets/{}{}", self.sheet_id, suffix)
    }

    fn call_span(&self, op: &'static str) -> Span {
        info_span!("sheet_call", sheet_id = %self.sheet_id, op)
    }
}

#[async_trait]
impl SheetSource for SmartsheetAdapter {
    fn sheet_id(&self) -> SheetId {
        self.sheet_id
    }

    async fn fetch_all(&self, include_format: bool) -> Result<Vec<SheetRow>, SheetError> {
        let query = if include_format {
            vec![("include", "format".to_string())]
        } else {
            Vec::new()
        };
        let body: SheetBody = self
            .http
            .get_json(&self.sheet_path(""), &query)
            .instrument(self.call_span("fetch_all"))
            .await?;
        debug!(sheet_id = %self.sheet_id, rows = body.rows.len(), include_format, "fetched sheet");
        Ok(body.rows)
    }

    async fn fetch_one(&self, row_id: RowId) -> Result<SheetRow, SheetError> {
        let path = self.sheet_path(&format!("/rows/{row_id}"));
        Ok(self
            .http
            .get_json(&path, &[])
            .instrument(self.call_span("fetch_one"))
            .await?)
    }

    async fn create(&self, row: &RowPayload) -> Result<(), SheetError> {
        self.http
            .post_json(&self.sheet_path("/rows"), std::slice::from_ref(row))
            .instrument(self.call_span("create"))
            .await?;
        Ok(())
    }

    async fn update(&self, row_id: RowId, row: &RowPayload) -> Result<(), SheetError> {
        let body = [RowUpdate { id: row_id, row }];
        self.http
            .put_json(&self.sheet_path("/rows"), &body)
            .instrument(self.call_span("update"))
            .await?;
        Ok(())
    }

    async fn delete(&self, row_id: RowId) -> Result<(), SheetError> {
        self.http
            .delete(&self.sheet_path("/rows"), &[("ids", row_id.to_string())])
            .instrument(self.call_span("delete"))
            .await?;
        Ok(())
    }

    async fn relocate(&self, row_id: RowId, destination: SheetId) -> Result<(), SheetError> {
        let body = MoveRequest {
            row_ids: vec![row_id],
            to: MoveDestination {
                sheet_id: destination,
            },
        };
        self.http
            .post_json(&self.sheet_path("/rows/move"), &body)
            .instrument(self.call_span("relocate"))
            .await?;
        Ok(())
    }

    async fn reorder(&self, criteria: &[SortCriterion]) -> Result<(), SheetError> {
        let body = SortRequest {
            sort_criteria: criteria,
        };
        self.http
            .post_json(&self.sheet_path("/sort"), &body)
            .instrument(self.call_span("reorder"))
            .await?;
        Ok(())
    }
}
