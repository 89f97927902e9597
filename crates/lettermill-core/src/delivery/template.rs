//! Per-recipient template rendering
//!
//! Campaign bodies use `{{placeholder}}` syntax. Supported placeholders:
//! `email`, `name`, `first_name`, `last_name`, `attributes.<key>`, and
//! `unsubscribe_url`. A placeholder that cannot be resolved is a
//! rendering error, which the worker treats as a permanent per-item
//! failure rather than shipping a broken email.

use lettermill_common::config::Config;
use lettermill_common::signature;
use lettermill_common::types::{CampaignId, SubscriberId};
use lettermill_storage::models::{Campaign, Subscriber};
use regex::Regex;
use thiserror::Error;

use crate::delivery::transport::OutgoingEmail;

/// Rendering errors
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Unknown placeholder: {{{{{0}}}}}")]
    UnknownPlaceholder(String),

    #[error("Campaign has no body")]
    EmptyBody,
}

/// Renders campaign bodies against subscriber data
pub struct TemplateRenderer {
    unsubscribe_base_url: String,
    signing_secret: String,
    placeholder_re: Regex,
}

impl TemplateRenderer {
    pub fn new(unsubscribe_base_url: &str, signing_secret: &str) -> Self {
        Self {
            unsubscribe_base_url: unsubscribe_base_url.trim_end_matches('/').to_string(),
            signing_secret: signing_secret.to_string(),
            placeholder_re: Regex::new(r"\{\{\s*([a-zA-Z0-9_.]+)\s*\}\}")
                .expect("placeholder regex is valid"),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.server.unsubscribe_base_url,
            &config.webhook.signing_secret,
        )
    }

    /// Signed one-click unsubscribe link. The token binds subscriber and
    /// campaign so a leaked link cannot unsubscribe anyone else.
    pub fn unsubscribe_url(&self, subscriber_id: SubscriberId, campaign_id: CampaignId) -> String {
        let payload = format!("{}:{}", subscriber_id, campaign_id);
        let token = signature::sign(&self.signing_secret, payload.as_bytes());
        format!(
            "{}/unsubscribe?sid={}&cid={}&token={}",
            self.unsubscribe_base_url, subscriber_id, campaign_id, token
        )
    }

    /// Verify an unsubscribe token minted by `unsubscribe_url`
    pub fn verify_unsubscribe_token(
        &self,
        subscriber_id: SubscriberId,
        campaign_id: CampaignId,
        token: &str,
    ) -> bool {
        let payload = format!("{}:{}", subscriber_id, campaign_id);
        signature::verify(&self.signing_secret, payload.as_bytes(), token)
    }

    fn lookup(
        &self,
        key: &str,
        subscriber: &Subscriber,
        unsubscribe_url: &str,
    ) -> Option<String> {
        match key {
            "email" => Some(subscriber.email.clone()),
            "name" => Some(subscriber.name.clone().unwrap_or_default()),
            "first_name" => Some(
                subscriber
                    .name
                    .as_deref()
                    .and_then(|n| n.split_whitespace().next())
                    .unwrap_or_default()
                    .to_string(),
            ),
            "last_name" => {
                let last = subscriber
                    .name
                    .as_deref()
                    .map(|n| {
                        let mut parts = n.split_whitespace();
                        let first = parts.next();
                        parts.last().or(first).unwrap_or_default().to_string()
                    })
                    .unwrap_or_default();
                Some(last)
            }
            "unsubscribe_url" => Some(unsubscribe_url.to_string()),
            _ => {
                let attr_key = key.strip_prefix("attributes.")?;
                subscriber
                    .attributes
                    .get(attr_key)
                    .map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
            }
        }
    }

    fn render_text(
        &self,
        template: &str,
        subscriber: &Subscriber,
        unsubscribe_url: &str,
    ) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in self.placeholder_re.captures_iter(template) {
            let whole = caps.get(0).expect("capture 0 always present");
            let key = &caps[1];
            let value = self
                .lookup(key, subscriber, unsubscribe_url)
                .ok_or_else(|| TemplateError::UnknownPlaceholder(key.to_string()))?;
            out.push_str(&template[last..whole.start()]);
            out.push_str(&value);
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }

    /// Render a campaign for one subscriber into a ready-to-send email
    pub fn render(
        &self,
        campaign: &Campaign,
        subscriber: &Subscriber,
        to_address: &str,
    ) -> Result<OutgoingEmail, TemplateError> {
        if campaign.html_body.is_none() && campaign.text_body.is_none() {
            return Err(TemplateError::EmptyBody);
        }

        let unsubscribe_url = self.unsubscribe_url(subscriber.id, campaign.id);

        let subject = self.render_text(&campaign.subject, subscriber, &unsubscribe_url)?;
        let html_body = campaign
            .html_body
            .as_deref()
            .map(|b| self.render_text(b, subscriber, &unsubscribe_url))
            .transpose()?;
        let text_body = campaign
            .text_body
            .as_deref()
            .map(|b| self.render_text(b, subscriber, &unsubscribe_url))
            .transpose()?;

        Ok(OutgoingEmail {
            to: to_address.to_string(),
            from_address: campaign.from_address.clone(),
            from_name: campaign.from_name.clone(),
            reply_to: campaign.reply_to.clone(),
            subject,
            html_body,
            text_body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn subscriber(name: Option<&str>) -> Subscriber {
        Subscriber {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            name: name.map(String::from),
            status: "active".to_string(),
            verified: true,
            consent_given_at: Some(Utc::now()),
            consent_source_ip: None,
            engagement_score: 0,
            tags: serde_json::json!([]),
            attributes: serde_json::json!({"city": "London", "plan": "pro"}),
            last_engaged_at: None,
            unsubscribed_at: None,
            deleted_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn renderer() -> TemplateRenderer {
        TemplateRenderer::new("https://mail.example.com", "test-secret")
    }

    #[test]
    fn test_render_basic_placeholders() {
        let r = renderer();
        let s = subscriber(Some("Ada Lovelace"));
        let url = r.unsubscribe_url(s.id, Uuid::new_v4());
        let out = r
            .render_text("Hi {{first_name}} ({{email}})", &s, &url)
            .unwrap();
        assert_eq!(out, "Hi Ada (ada@example.com)");
    }

    #[test]
    fn test_render_attributes() {
        let r = renderer();
        let s = subscriber(Some("Ada Lovelace"));
        let out = r
            .render_text("You live in {{attributes.city}}", &s, "u")
            .unwrap();
        assert_eq!(out, "You live in London");
    }

    #[test]
    fn test_unknown_placeholder_is_an_error() {
        let r = renderer();
        let s = subscriber(None);
        let err = r.render_text("Hi {{nickname}}", &s, "u").unwrap_err();
        assert!(matches!(err, TemplateError::UnknownPlaceholder(k) if k == "nickname"));
    }

    #[test]
    fn test_unknown_attribute_is_an_error() {
        let r = renderer();
        let s = subscriber(None);
        let err = r
            .render_text("{{attributes.missing}}", &s, "u")
            .unwrap_err();
        assert!(matches!(err, TemplateError::UnknownPlaceholder(_)));
    }

    #[test]
    fn test_missing_name_renders_empty() {
        let r = renderer();
        let s = subscriber(None);
        let out = r.render_text("Hi {{name}}!", &s, "u").unwrap();
        assert_eq!(out, "Hi !");
    }

    #[test]
    fn test_unsubscribe_url_token_verifies() {
        let r = renderer();
        let sid = Uuid::new_v4();
        let cid = Uuid::new_v4();
        let url = r.unsubscribe_url(sid, cid);
        let token = url.split("token=").nth(1).unwrap();
        assert!(r.verify_unsubscribe_token(sid, cid, token));
        assert!(!r.verify_unsubscribe_token(cid, sid, token));
    }

    #[test]
    fn test_render_full_email() {
        let r = renderer();
        let s = subscriber(Some("Ada Lovelace"));
        let campaign = Campaign {
            id: Uuid::new_v4(),
            name: "Launch".to_string(),
            description: None,
            subject: "Hello {{first_name}}".to_string(),
            from_address: "news@example.com".to_string(),
            from_name: Some("Example News".to_string()),
            reply_to: None,
            html_body: Some("<p>Hi {{name}}</p><a href=\"{{unsubscribe_url}}\">bye</a>".to_string()),
            text_body: Some("Hi {{name}}".to_string()),
            targeting: serde_json::json!({}),
            scheduled_at: None,
            status: "sending".to_string(),
            failure_reason: None,
            total_recipients: 0,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let email = r.render(&campaign, &s, &s.email).unwrap();
        assert_eq!(email.subject, "Hello Ada");
        assert_eq!(email.text_body.as_deref(), Some("Hi Ada Lovelace"));
        assert!(email.html_body.unwrap().contains("/unsubscribe?sid="));
    }

    #[test]
    fn test_empty_body_is_an_error() {
        let r = renderer();
        let s = subscriber(None);
        let mut campaign = Campaign {
            id: Uuid::new_v4(),
            name: "x".to_string(),
            description: None,
            subject: "s".to_string(),
            from_address: "a@b.c".to_string(),
            from_name: None,
            reply_to: None,
            html_body: None,
            text_body: None,
            targeting: serde_json::json!({}),
            scheduled_at: None,
            status: "sending".to_string(),
            failure_reason: None,
            total_recipients: 0,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(matches!(
            r.render(&campaign, &s, &s.email),
            Err(TemplateError::EmptyBody)
        ));
        campaign.text_body = Some("ok".to_string());
        assert!(r.render(&campaign, &s, &s.email).is_ok());
    }
}
