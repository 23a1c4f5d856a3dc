//! Message templates.
//!
//! Every message kind has a [`TemplateType`], a typed model (see [`email`] and [`sms`])
//! and a directory under the templates root holding one file per [`TemplatePart`]:
//!
//! ```text
//! <root>/verification/valid/email.subject.tera
//! <root>/verification/valid/email.body.tera
//! <root>/verification/valid/email.body.plaintext.tera
//! <root>/login_code/sms/sms.body.tera
//! ```
//!
//! Models are serialized verbatim into the queued message so the body can be rendered
//! again at dispatch time; [`email_template_from`] and [`sms_template_from`] rebuild them.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{CourierError, CourierResult};
use crate::message::MessageChannel;

pub mod email;
pub mod loader;
pub mod sms;

pub use email::{
    LoginCodeValid, LoginCodeValidModel, RecoveryInvalid, RecoveryInvalidModel, RecoveryValid,
    RecoveryValidModel, VerificationInvalid, VerificationInvalidModel, VerificationValid,
    VerificationValidModel,
};
pub use loader::TemplateRenderer;
pub use sms::{CodeMessage, CodeMessageModel};

/// Identifies the model shape and file layout of a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    RecoveryValid,
    RecoveryInvalid,
    VerificationValid,
    VerificationInvalid,
    LoginCodeValid,
    SmsLoginCode,
    SmsVerificationCode,
}

impl TemplateType {
    pub const ALL: [TemplateType; 7] = [
        TemplateType::RecoveryValid,
        TemplateType::RecoveryInvalid,
        TemplateType::VerificationValid,
        TemplateType::VerificationInvalid,
        TemplateType::LoginCodeValid,
        TemplateType::SmsLoginCode,
        TemplateType::SmsVerificationCode,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateType::RecoveryValid => "recovery_valid",
            TemplateType::RecoveryInvalid => "recovery_invalid",
            TemplateType::VerificationValid => "verification_valid",
            TemplateType::VerificationInvalid => "verification_invalid",
            TemplateType::LoginCodeValid => "login_code_valid",
            TemplateType::SmsLoginCode => "sms_login_code",
            TemplateType::SmsVerificationCode => "sms_verification_code",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }

    pub fn channel(&self) -> MessageChannel {
        match self {
            TemplateType::SmsLoginCode | TemplateType::SmsVerificationCode => MessageChannel::Sms,
            _ => MessageChannel::Email,
        }
    }

    /// Directory of this kind relative to the templates root
    pub fn directory(&self) -> &'static str {
        match self {
            TemplateType::RecoveryValid => "recovery/valid",
            TemplateType::RecoveryInvalid => "recovery/invalid",
            TemplateType::VerificationValid => "verification/valid",
            TemplateType::VerificationInvalid => "verification/invalid",
            TemplateType::LoginCodeValid => "login_code/valid",
            TemplateType::SmsLoginCode => "login_code/sms",
            TemplateType::SmsVerificationCode => "verification_code/sms",
        }
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One renderable piece of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemplatePart {
    EmailSubject,
    EmailBody,
    EmailBodyPlaintext,
    SmsBody,
}

impl TemplatePart {
    pub fn file_stem(&self) -> &'static str {
        match self {
            TemplatePart::EmailSubject => "email.subject",
            TemplatePart::EmailBody => "email.body",
            TemplatePart::EmailBodyPlaintext => "email.body.plaintext",
            TemplatePart::SmsBody => "sms.body",
        }
    }

    /// Path of the primary template file, relative to the root
    pub fn primary_path(&self, template_type: TemplateType) -> String {
        format!("{}/{}.tera", template_type.directory(), self.file_stem())
    }

    /// Glob searched when the primary file is absent, relative to the root
    pub fn fallback_glob(&self, template_type: TemplateType) -> String {
        format!("{}/{}*", template_type.directory(), self.file_stem())
    }

    /// Only the HTML body escapes model values
    pub fn autoescape(&self) -> bool {
        matches!(self, TemplatePart::EmailBody)
    }
}

/// Renderable email message model
pub trait EmailTemplate: Send + Sync {
    fn template_type(&self) -> TemplateType;

    fn email_recipient(&self) -> &str;

    /// Model as stored in `template_data`
    fn template_data(&self) -> CourierResult<serde_json::Value>;

    fn email_subject(&self, renderer: &TemplateRenderer) -> CourierResult<String> {
        renderer.render_part(
            self.template_type(),
            TemplatePart::EmailSubject,
            &self.template_data()?,
        )
    }

    fn email_body(&self, renderer: &TemplateRenderer) -> CourierResult<String> {
        renderer.render_part(
            self.template_type(),
            TemplatePart::EmailBody,
            &self.template_data()?,
        )
    }

    fn email_body_plaintext(&self, renderer: &TemplateRenderer) -> CourierResult<String> {
        renderer.render_part(
            self.template_type(),
            TemplatePart::EmailBodyPlaintext,
            &self.template_data()?,
        )
    }
}

/// Renderable SMS message model
pub trait SmsTemplate: Send + Sync {
    fn template_type(&self) -> TemplateType;

    fn phone_number(&self) -> &str;

    /// Route through the standby SMS provider when one is configured
    fn use_standby_sender(&self) -> bool {
        false
    }

    /// Model as stored in `template_data`
    fn template_data(&self) -> CourierResult<serde_json::Value>;

    fn sms_body(&self, renderer: &TemplateRenderer) -> CourierResult<String> {
        renderer.render_part(
            self.template_type(),
            TemplatePart::SmsBody,
            &self.template_data()?,
        )
    }
}

/// Rebuild an email model from a queued message's template columns
pub fn email_template_from(
    template_type: TemplateType,
    data: &serde_json::Value,
) -> CourierResult<Box<dyn EmailTemplate>> {
    let data = data.clone();
    let template: Box<dyn EmailTemplate> = match template_type {
        TemplateType::RecoveryValid => Box::new(RecoveryValid::new(serde_json::from_value(data)?)),
        TemplateType::RecoveryInvalid => {
            Box::new(RecoveryInvalid::new(serde_json::from_value(data)?))
        }
        TemplateType::VerificationValid => {
            Box::new(VerificationValid::new(serde_json::from_value(data)?))
        }
        TemplateType::VerificationInvalid => {
            Box::new(VerificationInvalid::new(serde_json::from_value(data)?))
        }
        TemplateType::LoginCodeValid => {
            Box::new(LoginCodeValid::new(serde_json::from_value(data)?))
        }
        TemplateType::SmsLoginCode | TemplateType::SmsVerificationCode => {
            return Err(CourierError::UnknownTemplateType(format!(
                "{} is not an email template",
                template_type
            )))
        }
    };
    Ok(template)
}

/// Rebuild an SMS model from a queued message's template columns
pub fn sms_template_from(
    template_type: TemplateType,
    data: &serde_json::Value,
) -> CourierResult<Box<dyn SmsTemplate>> {
    match template_type {
        TemplateType::SmsLoginCode | TemplateType::SmsVerificationCode => Ok(Box::new(
            CodeMessage::new(template_type, serde_json::from_value(data.clone())?)?,
        )),
        _ => Err(CourierError::UnknownTemplateType(format!(
            "{} is not an SMS template",
            template_type
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_type_strings_are_stable() {
        for template_type in TemplateType::ALL {
            assert_eq!(TemplateType::parse(template_type.as_str()), Some(template_type));
        }
        assert_eq!(TemplateType::parse("stub"), None);
    }

    #[test]
    fn test_file_convention() {
        assert_eq!(
            TemplatePart::EmailBody.primary_path(TemplateType::VerificationValid),
            "verification/valid/email.body.tera"
        );
        assert_eq!(
            TemplatePart::SmsBody.fallback_glob(TemplateType::SmsLoginCode),
            "login_code/sms/sms.body*"
        );
    }

    #[test]
    fn test_rebuild_rejects_channel_mismatch() {
        let data = serde_json::json!({ "to": "+15551234567", "code": "123456" });
        assert!(matches!(
            email_template_from(TemplateType::SmsLoginCode, &data),
            Err(CourierError::UnknownTemplateType(_))
        ));

        let data = serde_json::json!({ "to": "foo@ory.sh" });
        assert!(matches!(
            sms_template_from(TemplateType::RecoveryInvalid, &data),
            Err(CourierError::UnknownTemplateType(_))
        ));
    }

    #[test]
    fn test_rebuild_round_trips_model() {
        let model = VerificationValidModel {
            to: "foo@ory.sh".to_string(),
            verification_url: "https://example.org/verify?token=abc".to_string(),
        };
        let original = VerificationValid::new(model);
        let data = original.template_data().unwrap();

        let rebuilt = email_template_from(TemplateType::VerificationValid, &data).unwrap();
        assert_eq!(rebuilt.email_recipient(), "foo@ory.sh");
        assert_eq!(rebuilt.template_data().unwrap(), data);
    }
}
