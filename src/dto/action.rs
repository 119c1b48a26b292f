use serde::Deserialize;
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::validation::{validate_identifier, validate_slot, validate_text},
    state::actions::Action,
};

/// Body of `POST /api/actions`: one tagged action.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct ActionRequest(pub Action);

impl Validate for ActionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match &self.0 {
            Action::PickTeam { team_id } | Action::ResetTeamProgress { team_id, .. } => {
                if let Err(e) = validate_identifier(team_id) {
                    errors.add("team_id", e);
                }
            }
            Action::SubmitCode { code } => {
                if let Err(e) = validate_text(code) {
                    errors.add("code", e);
                }
            }
            Action::AnswerTrivia { answer } => {
                if let Err(e) = validate_text(answer) {
                    errors.add("answer", e);
                }
            }
            Action::UpdateName { index, value } => {
                if let Err(e) = validate_slot(*index) {
                    errors.add("index", e);
                }
                if let Err(e) = validate_text(value) {
                    errors.add("value", e);
                }
            }
            _ => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(json: &str) -> ActionRequest {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn well_formed_actions_pass() {
        assert!(request(r#"{"type":"submit_code","code":"abc"}"#).validate().is_ok());
        assert!(request(r#"{"type":"go_home"}"#).validate().is_ok());
    }

    #[test]
    fn bad_fields_are_reported_by_name() {
        let errors = request(r#"{"type":"pick_team","team_id":"no such team"}"#)
            .validate()
            .unwrap_err();
        assert!(errors.field_errors().contains_key("team_id"));

        let long = "x".repeat(500);
        let errors = request(&format!(
            r#"{{"type":"update_name","index":9999,"value":"{long}"}}"#
        ))
        .validate()
        .unwrap_err();
        assert!(errors.field_errors().contains_key("index"));
        assert!(errors.field_errors().contains_key("value"));
    }
}
