//! Upstream data endpoints, query parameters, and the decoded response payload.

// self
use crate::{_prelude::*, error::ConfigError};

/// Read-only WHOOP data endpoints reachable through the gateway.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
	/// Basic user profile.
	Profile,
	/// Workout activities.
	Workouts,
	/// Recovery scores.
	Recovery,
	/// Sleep activities.
	Sleep,
	/// Physiological cycles.
	Cycles,
}
impl Endpoint {
	/// Every endpoint, in declaration order.
	pub const ALL: [Self; 5] = [Self::Profile, Self::Workouts, Self::Recovery, Self::Sleep, Self::Cycles];

	/// Stable short label used in logs and cache identities.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Profile => "profile",
			Self::Workouts => "workouts",
			Self::Recovery => "recovery",
			Self::Sleep => "sleep",
			Self::Cycles => "cycles",
		}
	}

	/// Tool-facing operation name.
	pub const fn logical_name(self) -> &'static str {
		match self {
			Self::Profile => "get_whoop_profile",
			Self::Workouts => "get_whoop_workouts",
			Self::Recovery => "get_whoop_recovery",
			Self::Sleep => "get_whoop_sleep",
			Self::Cycles => "get_whoop_cycles",
		}
	}

	/// Path relative to the API base URL.
	pub const fn path(self) -> &'static str {
		match self {
			Self::Profile => "/user/profile/basic",
			Self::Workouts => "/activity/workout",
			Self::Recovery => "/recovery",
			Self::Sleep => "/activity/sleep",
			Self::Cycles => "/cycle",
		}
	}

	/// Returns `true` for paginated collection endpoints that accept a [`DataQuery`].
	pub const fn is_collection(self) -> bool {
		!matches!(self, Self::Profile)
	}
}
impl Display for Endpoint {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Endpoint {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|endpoint| endpoint.as_str() == s || endpoint.logical_name() == s)
			.ok_or_else(|| ConfigError::UnknownEndpoint { name: s.to_owned() })
	}
}

/// Filters and pagination for collection endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQuery {
	/// Inclusive lower bound, passed through verbatim (ISO 8601).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub start: Option<String>,
	/// Exclusive upper bound, passed through verbatim (ISO 8601).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub end: Option<String>,
	/// Page size.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub limit: Option<u32>,
	/// Continuation token from a previous page.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_token: Option<String>,
}
impl DataQuery {
	/// Largest page size the upstream accepts.
	pub const MAX_LIMIT: u32 = 25;

	/// Sets the lower bound.
	pub fn start(mut self, start: impl Into<String>) -> Self {
		self.start = Some(start.into());

		self
	}

	/// Sets the upper bound.
	pub fn end(mut self, end: impl Into<String>) -> Self {
		self.end = Some(end.into());

		self
	}

	/// Sets the page size.
	pub fn limit(mut self, limit: u32) -> Self {
		self.limit = Some(limit);

		self
	}

	/// Sets the continuation token.
	pub fn next_token(mut self, token: impl Into<String>) -> Self {
		self.next_token = Some(token.into());

		self
	}

	/// Ensures the page size is within `1..=MAX_LIMIT`.
	pub fn validate(&self) -> Result<(), ConfigError> {
		match self.limit {
			Some(limit) if !(1..=Self::MAX_LIMIT).contains(&limit) =>
				Err(ConfigError::InvalidLimit { limit, max: Self::MAX_LIMIT }),
			_ => Ok(()),
		}
	}

	/// Converts the query into upstream parameters, dropping unset and blank values.
	pub fn into_params(self) -> BTreeMap<String, String> {
		[
			("start", self.start),
			("end", self.end),
			("limit", self.limit.map(|limit| limit.to_string())),
			("nextToken", self.next_token),
		]
		.into_iter()
		.filter_map(|(key, value)| {
			value.filter(|value| !value.trim().is_empty()).map(|value| (key.to_owned(), value))
		})
		.collect()
	}
}

/// Decoded upstream response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payload {
	/// Records or object returned by the endpoint, passed through opaquely.
	pub data: Value,
	/// Continuation token for the next page, when the endpoint paginates.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub next_token: Option<String>,
}
impl Payload {
	/// Unwraps the upstream envelope.
	///
	/// Objects carrying `data` or `records` (collection pages) yield that field plus the
	/// page token; any other body becomes the data as-is.
	pub fn from_body(body: Value) -> Self {
		let Value::Object(mut object) = body else {
			return Self { data: body, next_token: None };
		};
		let Some(data) = object.remove("data").or_else(|| object.remove("records")) else {
			return Self { data: Value::Object(object), next_token: None };
		};
		let next_token = ["next_token", "nextToken"]
			.into_iter()
			.find_map(|key| object.get(key).and_then(Value::as_str))
			.filter(|token| !token.is_empty())
			.map(str::to_owned);

		Self { data, next_token }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn endpoints_parse_from_short_and_logical_names() {
		for endpoint in Endpoint::ALL {
			assert_eq!(endpoint.as_str().parse::<Endpoint>().ok(), Some(endpoint));
			assert_eq!(endpoint.logical_name().parse::<Endpoint>().ok(), Some(endpoint));
		}

		assert!(matches!(
			"get_whoop_strain".parse::<Endpoint>(),
			Err(ConfigError::UnknownEndpoint { .. })
		));
		assert_eq!(Endpoint::Workouts.path(), "/activity/workout");
		assert!(!Endpoint::Profile.is_collection());
	}

	#[test]
	fn query_params_use_upstream_names_and_skip_blanks() {
		let params = DataQuery::default()
			.start("2025-01-01T00:00:00Z")
			.end("  ")
			.limit(10)
			.next_token("abc")
			.into_params();

		assert_eq!(params.len(), 3);
		assert_eq!(params.get("limit").map(String::as_str), Some("10"));
		assert_eq!(params.get("nextToken").map(String::as_str), Some("abc"));
		assert!(!params.contains_key("end"));
	}

	#[test]
	fn query_limit_is_bounded() {
		assert!(DataQuery::default().limit(25).validate().is_ok());
		assert!(DataQuery::default().validate().is_ok());
		assert!(matches!(
			DataQuery::default().limit(0).validate(),
			Err(ConfigError::InvalidLimit { limit: 0, max: 25 })
		));
		assert!(DataQuery::default().limit(26).validate().is_err());
	}

	#[test]
	fn payload_unwraps_known_envelopes() {
		let page = Payload::from_body(serde_json::json!({
			"records": [{ "id": 1 }],
			"next_token": "page-2"
		}));

		assert_eq!(page.data, serde_json::json!([{ "id": 1 }]));
		assert_eq!(page.next_token.as_deref(), Some("page-2"));

		let wrapped = Payload::from_body(serde_json::json!({ "data": { "score": 80 } }));

		assert_eq!(wrapped.data, serde_json::json!({ "score": 80 }));
		assert_eq!(wrapped.next_token, None);

		let profile = serde_json::json!({ "user_id": 7, "first_name": "Ada" });

		assert_eq!(Payload::from_body(profile.clone()).data, profile);
		assert_eq!(Payload::from_body(Value::Null).data, Value::Null);
	}
}
