//! GraphQL operations as submitted by callers.
//!
//! An operation is a query or mutation document plus optional variables. The
//! client never inspects either; they are serialized verbatim into the POST
//! body.

use serde::Serialize;
use serde_json::{Map, Value};

/// Variables for an operation, keyed by variable name.
pub type Variables = Map<String, Value>;

/// A query or mutation document plus optional variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    /// The GraphQL document.
    #[serde(rename = "query")]
    pub document: String,

    /// Variables referenced by the document, if any.
    pub variables: Option<Variables>,
}

impl Operation {
    /// Creates an operation without variables.
    pub fn new(document: impl Into<String>) -> Self {
        Operation {
            document: document.into(),
            variables: None,
        }
    }

    /// Attaches variables to the operation.
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Returns the JSON body sent on the wire.
    ///
    /// A missing variables map is sent as an empty object.
    pub fn payload(&self) -> Value {
        let variables = self.variables.clone().unwrap_or_default();
        serde_json::json!({
            "query": self.document,
            "variables": variables,
        })
    }
}

impl From<&str> for Operation {
    fn from(document: &str) -> Self {
        Operation::new(document)
    }
}

impl From<String> for Operation {
    fn from(document: String) -> Self {
        Operation::new(document)
    }
}

impl From<(String, Option<Variables>)> for Operation {
    fn from((document, variables): (String, Option<Variables>)) -> Self {
        Operation {
            document,
            variables,
        }
    }
}

impl From<(&str, Variables)> for Operation {
    fn from((document, variables): (&str, Variables)) -> Self {
        Operation::new(document).with_variables(variables)
    }
}
