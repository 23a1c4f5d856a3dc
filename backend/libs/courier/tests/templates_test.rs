use courier::config::TemplateOverride;
use courier::template::{
    CodeMessage, CodeMessageModel, EmailTemplate, LoginCodeValid, LoginCodeValidModel,
    RecoveryInvalid, RecoveryInvalidModel, RecoveryValid, RecoveryValidModel, SmsTemplate,
    TemplateRenderer, TemplateType, VerificationInvalid, VerificationInvalidModel,
};
use courier::CourierError;
use std::fs;
use std::path::PathBuf;

fn shipped() -> TemplateRenderer {
    TemplateRenderer::new(PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("templates"))
}

fn email_templates() -> Vec<Box<dyn EmailTemplate>> {
    vec![
        Box::new(RecoveryValid::new(RecoveryValidModel {
            to: "foo@ory.sh".to_string(),
            recovery_url: "https://www.ory.sh/recover?token=abc".to_string(),
            identity: None,
        })),
        Box::new(RecoveryInvalid::new(RecoveryInvalidModel {
            to: "foo@ory.sh".to_string(),
        })),
        Box::new(courier::template::VerificationValid::new(
            courier::template::VerificationValidModel {
                to: "foo@ory.sh".to_string(),
                verification_url: "https://www.ory.sh/verify?token=abc".to_string(),
            },
        )),
        Box::new(VerificationInvalid::new(VerificationInvalidModel {
            to: "foo@ory.sh".to_string(),
        })),
        Box::new(LoginCodeValid::new(LoginCodeValidModel {
            to: "foo@ory.sh".to_string(),
            login_code: "424242".to_string(),
            identity: None,
        })),
    ]
}

#[test]
fn test_every_shipped_email_template_renders() {
    let renderer = shipped();
    for template in email_templates() {
        let subject = template.email_subject(&renderer).unwrap();
        let body = template.email_body(&renderer).unwrap();
        let plaintext = template.email_body_plaintext(&renderer).unwrap();

        assert!(!subject.trim().is_empty(), "{}", template.template_type());
        assert!(!subject.contains('\n'), "{}", template.template_type());
        assert!(body.contains("<p>"), "{}", template.template_type());
        assert!(!plaintext.contains("<p>"), "{}", template.template_type());
    }
}

#[test]
fn test_login_code_rendered_into_bodies() {
    let renderer = shipped();
    let email = LoginCodeValid::new(LoginCodeValidModel {
        to: "foo@ory.sh".to_string(),
        login_code: "424242".to_string(),
        identity: None,
    });
    assert!(email.email_body(&renderer).unwrap().contains("424242"));
    assert!(email.email_body_plaintext(&renderer).unwrap().contains("424242"));

    let model = CodeMessageModel {
        to: "+15551234567".to_string(),
        code: "123456".to_string(),
        use_standby_sender: false,
    };
    assert_eq!(
        CodeMessage::login(model.clone()).sms_body(&renderer).unwrap(),
        "Your login code is: 123456"
    );
    assert_eq!(
        CodeMessage::verification(model).sms_body(&renderer).unwrap(),
        "Your verification code is: 123456"
    );
}

#[test]
fn test_plaintext_keeps_urls_verbatim() {
    let renderer = shipped();
    let template = RecoveryValid::new(RecoveryValidModel {
        to: "foo@ory.sh".to_string(),
        recovery_url: "https://www.ory.sh/recover?token=abc&flow=1".to_string(),
        identity: None,
    });

    let plaintext = template.email_body_plaintext(&renderer).unwrap();
    assert!(plaintext.contains("https://www.ory.sh/recover?token=abc&flow=1"));
}

#[test]
fn test_override_wins_over_shipped_file() {
    let renderer = shipped().with_override(
        TemplateType::RecoveryInvalid,
        TemplateOverride {
            subject: Some("Custom subject {{ to }}".to_string()),
            ..Default::default()
        },
    );
    let template = RecoveryInvalid::new(RecoveryInvalidModel {
        to: "foo@ory.sh".to_string(),
    });

    assert_eq!(
        template.email_subject(&renderer).unwrap(),
        "Custom subject {{ to }}"
    );
    // parts without an override still come from files
    assert!(template.email_body(&renderer).unwrap().contains("<p>"));
}

#[test]
fn test_fallback_and_not_found_in_custom_root() {
    let dir = tempfile::tempdir().unwrap();
    let sms_dir = dir.path().join("login_code/sms");
    fs::create_dir_all(&sms_dir).unwrap();
    fs::write(sms_dir.join("sms.body.en.txt"), "Code {{ code }}").unwrap();

    let renderer = TemplateRenderer::new(dir.path());
    let model = CodeMessageModel {
        to: "+15551234567".to_string(),
        code: "99".to_string(),
        use_standby_sender: false,
    };

    assert_eq!(
        CodeMessage::login(model.clone()).sms_body(&renderer).unwrap(),
        "Code 99"
    );
    assert!(matches!(
        CodeMessage::verification(model).sms_body(&renderer),
        Err(CourierError::TemplateNotFound { .. })
    ));
}
