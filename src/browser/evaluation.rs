use chromiumoxide::cdp::js_protocol::runtime;
use serde::de::DeserializeOwned;
use serde_json as json;

use crate::browser::{DriverError, Page};

pub async fn evaluate<Output: DeserializeOwned>(
    page: &dyn Page,
    function_expression: &str,
    arguments: Vec<json::Value>,
) -> Result<Output, DriverError> {
    let value = page.evaluate_function(function_expression, arguments).await?;
    json::from_value(value).map_err(Into::into)
}

pub fn function_call_expression(
    function_expression: &str,
    arguments: &[json::Value],
) -> Result<String, DriverError> {
    let mut arguments_json = Vec::with_capacity(arguments.len());
    for arg in arguments {
        arguments_json.push(json::to_string(arg)?);
    }
    Ok(format!(
        "({})({})",
        function_expression,
        arguments_json.join(", ")
    ))
}

pub fn returned_value(
    result: runtime::RemoteObject,
    exception: Option<runtime::ExceptionDetails>,
) -> Result<json::Value, DriverError> {
    if let Some(exception) = exception {
        let description = exception
            .exception
            .as_ref()
            .and_then(|object| object.description.clone())
            .unwrap_or(exception.text);
        return Err(DriverError::Evaluation(description));
    }
    match result.value {
        Some(value) => Ok(value),
        None => match (&result.r#type, &result.subtype) {
            (_, Some(runtime::RemoteObjectSubtype::Null))
            | (runtime::RemoteObjectType::Undefined, _) => {
                Ok(json::Value::Null)
            }
            _ => Err(DriverError::Evaluation(format!(
                "no return value from function call: {:?}",
                result
            ))),
        },
    }
}

pub fn remote_object_to_json(object: &runtime::RemoteObject) -> json::Value {
    match (&object.r#type, &object.value, &object.description) {
        (_, Some(value), _) => value.clone(),
        (_, None, Some(description)) => {
            json::Value::String(description.clone())
        }
        (r#type, _, _) => {
            json::Value::String(format!("<object of type {:?}>", r#type))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_function_call_expression_quotes_arguments() {
        let expression = function_call_expression(
            "(a, b) => a + b",
            &[json!("it's \"quoted\""), json!(3)],
        )
        .unwrap();
        assert_eq!(expression, r#"((a, b) => a + b)("it's \"quoted\"", 3)"#);
    }

    #[test]
    fn test_function_call_expression_without_arguments() {
        let expression = function_call_expression("() => 1", &[]).unwrap();
        assert_eq!(expression, "(() => 1)()");
    }
}
