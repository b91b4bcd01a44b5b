//! Named tool operations for an LLM tool-calling host.
//!
//! [`call_tool`] never fails: unknown tools, bad arguments, and pipeline errors all come back
//! as a [`ToolResponse`] whose `error` carries the stable [`Error::kind`] label.

// self
use crate::{
	_prelude::*,
	endpoint::{DataQuery, Endpoint},
	pipeline::Gateway,
};

/// Page size used when a collection tool is called without `limit`.
pub const DEFAULT_TOOL_LIMIT: u32 = 5;

/// Tools exposed to the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Tool {
	/// `get_whoop_auth_status`.
	AuthStatus,
	/// One of the `get_whoop_*` data tools.
	Fetch(Endpoint),
	/// `clear_whoop_cache`.
	ClearCache,
}
impl Tool {
	/// Every tool, in the order hosts list them.
	pub const ALL: [Self; 7] = [
		Self::AuthStatus,
		Self::Fetch(Endpoint::Profile),
		Self::Fetch(Endpoint::Workouts),
		Self::Fetch(Endpoint::Recovery),
		Self::Fetch(Endpoint::Sleep),
		Self::Fetch(Endpoint::Cycles),
		Self::ClearCache,
	];

	/// Name the host calls the tool by.
	pub const fn name(self) -> &'static str {
		match self {
			Self::AuthStatus => "get_whoop_auth_status",
			Self::Fetch(endpoint) => endpoint.logical_name(),
			Self::ClearCache => "clear_whoop_cache",
		}
	}

	/// One-line description suitable for a tool listing.
	pub const fn description(self) -> &'static str {
		match self {
			Self::AuthStatus => "Get the current WHOOP authentication status.",
			Self::Fetch(Endpoint::Profile) => "Get the WHOOP user profile.",
			Self::Fetch(Endpoint::Workouts) => "Get recent WHOOP workouts.",
			Self::Fetch(Endpoint::Recovery) => "Get recent WHOOP recovery scores.",
			Self::Fetch(Endpoint::Sleep) => "Get recent WHOOP sleep data.",
			Self::Fetch(Endpoint::Cycles) => "Get recent WHOOP physiological cycles.",
			Self::ClearCache => "Clear the WHOOP response cache.",
		}
	}
}
impl FromStr for Tool {
	type Err = ToolError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL.into_iter().find(|tool| tool.name() == s).ok_or_else(|| ToolError {
			kind: "unknown_tool".into(),
			message: format!("Unknown tool `{s}`."),
		})
	}
}

/// Arguments accepted by the collection tools. Unknown fields are rejected.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolArguments {
	/// Lower bound (ISO 8601).
	#[serde(default)]
	pub start_date: Option<String>,
	/// Upper bound (ISO 8601).
	#[serde(default)]
	pub end_date: Option<String>,
	/// Page size; defaults to [`DEFAULT_TOOL_LIMIT`].
	#[serde(default)]
	pub limit: Option<u32>,
	/// Continuation token from a previous page.
	#[serde(default)]
	pub next_token: Option<String>,
}
impl ToolArguments {
	/// Parses host-supplied arguments; `null` means none.
	pub fn from_value(arguments: Value) -> Result<Self, ToolError> {
		if arguments.is_null() {
			return Ok(Self::default());
		}

		serde_path_to_error::deserialize(arguments).map_err(|err| ToolError {
			kind: "invalid_arguments".into(),
			message: format!("Invalid argument at `{}`: {}.", err.path(), err.inner()),
		})
	}

	/// Converts the arguments into a pipeline query.
	pub fn into_query(self) -> DataQuery {
		DataQuery {
			start: self.start_date,
			end: self.end_date,
			limit: Some(self.limit.unwrap_or(DEFAULT_TOOL_LIMIT)),
			next_token: self.next_token,
		}
	}
}

/// Error half of a [`ToolResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolError {
	/// Stable snake_case category.
	pub kind: String,
	/// Human-readable description.
	pub message: String,
}
impl From<&Error> for ToolError {
	fn from(err: &Error) -> Self {
		Self { kind: err.kind().into(), message: err.to_string() }
	}
}

/// Structured result of one tool call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
	/// Name the tool was called by.
	pub tool: String,
	/// Result data on success.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
	/// Failure description.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ToolError>,
	/// Instant the response was produced.
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
}
impl ToolResponse {
	fn success(tool: &str, data: Value) -> Self {
		Self { tool: tool.into(), data: Some(data), error: None, timestamp: OffsetDateTime::now_utc() }
	}

	fn failure(tool: &str, error: ToolError) -> Self {
		Self { tool: tool.into(), data: None, error: Some(error), timestamp: OffsetDateTime::now_utc() }
	}

	/// Returns `true` when the call succeeded.
	pub fn is_success(&self) -> bool {
		self.error.is_none()
	}
}

/// Runs tool `name` with host-supplied `arguments` against `gateway`.
pub async fn call_tool(gateway: &Gateway, name: &str, arguments: Value) -> ToolResponse {
	tracing::debug!(tool = name, "Tool called.");

	let tool = match name.parse::<Tool>() {
		Ok(tool) => tool,
		Err(err) => return ToolResponse::failure(name, err),
	};
	let outcome = match tool {
		Tool::AuthStatus => match gateway.auth_status().await {
			Ok(status) => to_value(&status),
			Err(err) => Err(ToolError::from(&err)),
		},
		Tool::Fetch(Endpoint::Profile) => fetch_result(gateway.profile().await),
		Tool::Fetch(endpoint) => match ToolArguments::from_value(arguments) {
			Ok(arguments) => {
				let query = arguments.into_query();
				let result = match endpoint {
					Endpoint::Workouts => gateway.workouts(query).await,
					Endpoint::Recovery => gateway.recovery(query).await,
					Endpoint::Sleep => gateway.sleep(query).await,
					Endpoint::Cycles => gateway.cycles(query).await,
					Endpoint::Profile => gateway.profile().await,
				};

				fetch_result(result)
			},
			Err(err) => Err(err),
		},
		Tool::ClearCache => {
			let cleared = gateway.clear_cache();

			Ok(serde_json::json!({ "cleared": cleared, "message": "Cache cleared successfully." }))
		},
	};

	match outcome {
		Ok(data) => ToolResponse::success(name, data),
		Err(err) => ToolResponse::failure(name, err),
	}
}

fn fetch_result(result: Result<crate::endpoint::Payload>) -> Result<Value, ToolError> {
	match result {
		Ok(payload) => to_value(&payload),
		Err(err) => Err(ToolError::from(&err)),
	}
}

fn to_value<T>(value: &T) -> Result<Value, ToolError>
where
	T: Serialize,
{
	serde_json::to_value(value)
		.map_err(|err| ToolError { kind: "serialization".into(), message: err.to_string() })
}
