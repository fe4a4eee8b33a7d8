use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    error::{MonitorError, Result},
    log_info,
    models::Session,
    settings::ApiSettings,
    utils::FetchWindow,
};

use super::transport::{truncate_for_error, ApiTransport};

const ENABLE_LOGS: bool = true;

const FLOW_REPORT_OPTION: i64 = 3;
const FLOW_MEASUREMENT_TYPE: &str = "FLOW_METER_MEASUREMENT_TYPE";

const GET_FLOW_DATA_QUERY: &str = r#"
query getChartReportByType(
    $controllerId: Int!,
    $option: Int!,
    $startTime: Int,
    $endTime: Int,
    $type: ReportChartCategoryEnum!) {
  controller(controllerId: $controllerId) {
    id
    reporting(option: $option, startTime: $startTime, endTime: $endTime) {
      chartType(type: $type) {
        message
        title
        subtitle
        statistics
        xaxisArray
        yaxisArray
        xmin
        xmax
        ymin
        yaxis
        results
        __typename
      }
      __typename
    }
    zones {
        id
        name
    }
    __typename
  }
}
"#;

const CHART_TYPE_POINTER: &str = "/data/controller/reporting/chartType";
const ZONES_POINTER: &str = "/data/controller/zones";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct FlowQueryVariables<'a> {
    controller_id: i64,
    option: i64,
    start_time: i64,
    end_time: i64,
    #[serde(rename = "type")]
    measurement_type: &'a str,
}

/// Flow report JSON as returned by the API, already checked for the paths the parser reads.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFlowResponse(Value);

impl RawFlowResponse {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Query flow readings between `start` and `end`; omitted boundaries default to the start
/// of the current year and the end of the current month.
pub async fn fetch_flow_data(
    transport: &dyn ApiTransport,
    api: &ApiSettings,
    session: &Session,
    controller_id: i64,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<RawFlowResponse> {
    let now = Utc::now();
    if session.is_expired_at(now) {
        return Err(MonitorError::Auth(format!(
            "session expired at {}; re-authenticate before fetching",
            session.expires_at
        )));
    }

    let window = FetchWindow::resolve(start, end, now.date_naive())?;
    fetch_window(transport, api, session, controller_id, &window).await
}

pub(crate) async fn fetch_window(
    transport: &dyn ApiTransport,
    api: &ApiSettings,
    session: &Session,
    controller_id: i64,
    window: &FetchWindow,
) -> Result<RawFlowResponse> {
    let variables = FlowQueryVariables {
        controller_id,
        option: FLOW_REPORT_OPTION,
        start_time: window.start_epoch_secs(),
        end_time: window.end_epoch_secs(),
        measurement_type: FLOW_MEASUREMENT_TYPE,
    };
    let payload = json!({
        "query": GET_FLOW_DATA_QUERY,
        "variables": variables,
    });

    log_info!(
        "Fetching flow data for controller {controller_id} from {} to {}",
        window.start,
        window.end
    );

    let reply = transport
        .post_json(&api.graph_url, &session.access_token, &payload)
        .await
        .map_err(|err| MonitorError::Fetch(format!("{err:#}")))?;

    if !reply.is_success() {
        return Err(MonitorError::Fetch(format!(
            "flow query returned HTTP {}: {}",
            reply.status,
            truncate_for_error(&reply.body)
        )));
    }

    let value: Value = serde_json::from_str(&reply.body).map_err(|err| {
        MonitorError::Fetch(format!("flow response is not valid JSON: {err}"))
    })?;
    check_structure(&value)?;

    log_info!("Received {} bytes of flow data", reply.body.len());
    Ok(RawFlowResponse(value))
}

fn check_structure(value: &Value) -> Result<()> {
    if let Some(errors) = value.get("errors").and_then(Value::as_array) {
        if !errors.is_empty() {
            let message = errors
                .iter()
                .map(|error| {
                    error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(MonitorError::Fetch(format!("flow query failed: {message}")));
        }
    }

    if value.pointer(CHART_TYPE_POINTER).map_or(true, Value::is_null) {
        return Err(MonitorError::Fetch(
            "flow response is missing data.controller.reporting.chartType".into(),
        ));
    }
    if !value.pointer(ZONES_POINTER).map_or(false, Value::is_array) {
        return Err(MonitorError::Fetch(
            "flow response is missing data.controller.zones".into(),
        ));
    }
    Ok(())
}
