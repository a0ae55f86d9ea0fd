use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{BusinessResult, ResponseSink, Result};

#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    #[serde(rename = "areaCode")]
    pub area_code: &'a str,
    pub client_id: &'a str,
    pub grant_type: &'a str,
    pub password: &'a str,
    pub source: &'a str,
    pub username: &'a str,
}

impl<'a> TokenRequest<'a> {
    pub fn password_grant(username: &'a str, password: &'a str) -> Self {
        Self {
            area_code: "sunsynk",
            client_id: "csp-web",
            grant_type: "password",
            password,
            source: "sunsynk",
            username,
        }
    }
}

/// The `{success, msg, data}` envelope every cloud endpoint answers with.
#[derive(Debug, Default, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub success: Option<Value>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn into_business_result(self) -> BusinessResult {
        BusinessResult {
            success: is_truthy(self.success.as_ref()),
            message: self.msg,
            data: self.data,
        }
    }
}

/// Decodes a captured `{success, msg, data}` body.
pub fn decode_business(sink: &ResponseSink) -> Result<BusinessResult> {
    sink.json::<Envelope>().map(Envelope::into_business_result)
}

/// Token endpoints put the bearer token at `data.access_token`.
pub fn access_token(data: Option<&Value>) -> String {
    data.and_then(|data| data.get("access_token"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned()
}

/// The API reports `success` sometimes as a bool and sometimes as the
/// string `"true"`. Only those two count as truthy.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => text == "true",
        _ => false,
    }
}
