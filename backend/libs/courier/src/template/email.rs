//! Email template models.

use serde::{Deserialize, Serialize};

use super::{EmailTemplate, TemplateType};
use crate::error::CourierResult;

/// Recovery link for a known account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryValidModel {
    pub to: String,
    pub recovery_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<serde_json::Value>,
}

/// Recovery attempted for an address with no account behind it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryInvalidModel {
    pub to: String,
}

/// Verification link for an address owned by an identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationValidModel {
    pub to: String,
    pub verification_url: String,
}

/// Verification attempted for an unknown address
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VerificationInvalidModel {
    pub to: String,
}

/// One-time login code sent by email
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginCodeValidModel {
    pub to: String,
    pub login_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<serde_json::Value>,
}

/// Wraps a model struct into an [`EmailTemplate`] of the given kind.
macro_rules! email_template {
    ($(#[$meta:meta])* $name:ident, $model:ty, $template_type:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            model: $model,
        }

        impl $name {
            pub fn new(model: $model) -> Self {
                Self { model }
            }

            pub fn model(&self) -> &$model {
                &self.model
            }
        }

        impl EmailTemplate for $name {
            fn template_type(&self) -> TemplateType {
                $template_type
            }

            fn email_recipient(&self) -> &str {
                &self.model.to
            }

            fn template_data(&self) -> CourierResult<serde_json::Value> {
                Ok(serde_json::to_value(&self.model)?)
            }
        }
    };
}

email_template!(
    /// `recovery/valid` email
    RecoveryValid,
    RecoveryValidModel,
    TemplateType::RecoveryValid
);
email_template!(
    /// `recovery/invalid` email
    RecoveryInvalid,
    RecoveryInvalidModel,
    TemplateType::RecoveryInvalid
);
email_template!(
    /// `verification/valid` email
    VerificationValid,
    VerificationValidModel,
    TemplateType::VerificationValid
);
email_template!(
    /// `verification/invalid` email
    VerificationInvalid,
    VerificationInvalidModel,
    TemplateType::VerificationInvalid
);
email_template!(
    /// `login_code/valid` email
    LoginCodeValid,
    LoginCodeValidModel,
    TemplateType::LoginCodeValid
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_serialized_verbatim() {
        let template = LoginCodeValid::new(LoginCodeValidModel {
            to: "foo@ory.sh".to_string(),
            login_code: "424242".to_string(),
            identity: None,
        });

        assert_eq!(template.template_type(), TemplateType::LoginCodeValid);
        assert_eq!(template.email_recipient(), "foo@ory.sh");
        assert_eq!(
            template.template_data().unwrap(),
            serde_json::json!({ "to": "foo@ory.sh", "login_code": "424242" })
        );
    }

    #[test]
    fn test_identity_is_optional_on_recovery() {
        let model: RecoveryValidModel = serde_json::from_value(serde_json::json!({
            "to": "foo@ory.sh",
            "recovery_url": "https://example.org/recover"
        }))
        .unwrap();
        assert!(model.identity.is_none());
    }
}
