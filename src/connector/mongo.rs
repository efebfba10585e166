use crate::connector::ConfigDefinition;
use crate::connector::ValidationResponse;
use percent_encoding::utf8_percent_encode;
use percent_encoding::AsciiSet;
use percent_encoding::CONTROLS;
use serde_json::Map;
use serde_json::Value;
use url::Url;

pub const CONNECTION_URI: &str = "connection.uri";
pub const CONNECTION_USERNAME: &str = "connection.username";
pub const CONNECTION_PASSWORD: &str = "connection.password";
const DEFAULT_URI: &str = "mongodb://";

const USERINFO: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'%')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'=')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'|');

/// Console to Kafka Connect: makes sure `connection.uri` is set and carries the credentials.
pub fn apply_mongo_defaults(mut config: Map<String, Value>) -> Map<String, Value> {
    if !config.contains_key(CONNECTION_URI) {
        config.insert(CONNECTION_URI.to_owned(), Value::String(DEFAULT_URI.to_owned()));
    }

    let username = config.get(CONNECTION_USERNAME).and_then(Value::as_str);
    let password = config.get(CONNECTION_PASSWORD).and_then(Value::as_str);
    let uri = config.get(CONNECTION_URI).and_then(Value::as_str);
    let with_credentials = match (username, password, uri) {
        (Some(username), Some(password), Some(uri)) => Some(with_user_info(uri, username, password)),
        _ => None,
    };
    match with_credentials {
        Some(Some(uri)) => {
            config.insert(CONNECTION_URI.to_owned(), Value::String(uri));
        },
        Some(None) => debug!("cannot parse {}, leaving it unchanged", CONNECTION_URI),
        None => {},
    }
    config
}

fn with_user_info(uri: &str, username: &str, password: &str) -> Option<String> {
    if let Ok(mut url) = Url::parse(uri) {
        if url.set_username(username).is_ok() && url.set_password(Some(password)).is_ok() {
            return Some(url.to_string());
        }
    }

    // host-less (the bare default) and multi-host authorities are not urls, splice the credentials in front
    let (scheme, rest) = uri.split_once("://")?;
    let authority_end = rest.find(|c: char| matches!(c, '/' | '?' | '#')).unwrap_or(rest.len());
    let host_start = rest[..authority_end].rfind('@').map(|at| at + 1).unwrap_or(0);
    Some(format!(
        "{}://{}:{}@{}",
        scheme,
        utf8_percent_encode(username, USERINFO),
        utf8_percent_encode(password, USERINFO),
        &rest[host_start..]
    ))
}

/// Kafka Connect to Console: adds the username and password fields the console folds into the URI.
pub fn describe_mongo_credentials(mut response: ValidationResponse) -> ValidationResponse {
    response.configs.push(ConfigDefinition::optional_field(CONNECTION_USERNAME, "STRING", "MongoDB username"));
    response.configs.push(ConfigDefinition::optional_field(CONNECTION_PASSWORD, "PASSWORD", "MongoDB password"));
    response
}
