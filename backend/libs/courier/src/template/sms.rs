//! SMS template models.

use serde::{Deserialize, Serialize};

use super::{SmsTemplate, TemplateType};
use crate::error::{CourierError, CourierResult};

/// One-time code delivered by SMS
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CodeMessageModel {
    pub to: String,
    pub code: String,
    #[serde(default)]
    pub use_standby_sender: bool,
}

/// Code message for either the login or the verification flow
#[derive(Debug, Clone)]
pub struct CodeMessage {
    template_type: TemplateType,
    model: CodeMessageModel,
}

impl CodeMessage {
    /// Wrap a model; `template_type` must be one of the SMS kinds.
    pub fn new(template_type: TemplateType, model: CodeMessageModel) -> CourierResult<Self> {
        match template_type {
            TemplateType::SmsLoginCode | TemplateType::SmsVerificationCode => Ok(Self {
                template_type,
                model,
            }),
            other => Err(CourierError::UnknownTemplateType(format!(
                "{} is not an SMS template",
                other
            ))),
        }
    }

    pub fn login(model: CodeMessageModel) -> Self {
        Self {
            template_type: TemplateType::SmsLoginCode,
            model,
        }
    }

    pub fn verification(model: CodeMessageModel) -> Self {
        Self {
            template_type: TemplateType::SmsVerificationCode,
            model,
        }
    }

    pub fn model(&self) -> &CodeMessageModel {
        &self.model
    }
}

impl SmsTemplate for CodeMessage {
    fn template_type(&self) -> TemplateType {
        self.template_type
    }

    fn phone_number(&self) -> &str {
        &self.model.to
    }

    fn use_standby_sender(&self) -> bool {
        self.model.use_standby_sender
    }

    fn template_data(&self) -> CourierResult<serde_json::Value> {
        Ok(serde_json::to_value(&self.model)?)
    }
}
