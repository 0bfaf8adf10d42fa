use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ValidationError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(Gender {
    Male => "male",
    Female => "female",
    Other => "other",
    PreferNotToSay => "prefer_not_to_say",
});

str_enum!(SymptomSeverity {
    Mild => "mild",
    Moderate => "moderate",
    Severe => "severe",
});

str_enum!(QuestionKind {
    MultipleChoice => "multiple_choice",
    YesNo => "yes_no",
    Scale => "scale",
    FreeText => "free_text",
    Emergency => "emergency",
});

str_enum!(AssessmentSeverity {
    Low => "low",
    Moderate => "moderate",
    High => "high",
    Emergency => "emergency",
});

impl AssessmentSeverity {
    /// Ordering used when severities are compared or raised.
    pub fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Moderate => 1,
            Self::High => 2,
            Self::Emergency => 3,
        }
    }

    /// The higher of two severities.
    pub fn max(self, other: Self) -> Self {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

str_enum!(AssessmentSource {
    Model => "model",
    Fallback => "fallback",
    EmergencyRules => "emergency_rules",
});

str_enum!(DetectionMethod {
    Keywords => "keywords",
    Model => "model",
    PatientConfirmed => "patient_confirmed",
});

str_enum!(ConsultationStatus {
    Pending => "pending",
    Active => "active",
    Completed => "completed",
    Cancelled => "cancelled",
});

impl ConsultationStatus {
    /// Completed and cancelled consultations accept no further changes.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Active)
                | (Self::Pending, Self::Cancelled)
                | (Self::Active, Self::Completed)
                | (Self::Active, Self::Cancelled)
        )
    }
}

str_enum!(MessageSender {
    Patient => "patient",
    Doctor => "doctor",
    System => "system",
});

str_enum!(Role {
    Patient => "patient",
    Doctor => "doctor",
    Admin => "admin",
});

str_enum!(Permission {
    SubmitSymptoms => "submit_symptoms",
    JoinConsultations => "join_consultations",
    ManageConsultations => "manage_consultations",
    ViewAuditLog => "view_audit_log",
});

str_enum!(AuditEvent {
    Login => "login",
    Logout => "logout",
    SessionRefreshed => "session_refreshed",
    SessionExpired => "session_expired",
    AuthFailure => "auth_failure",
    AccessDenied => "access_denied",
    ApiAccess => "api_access",
    MedicalDataAccess => "medical_data_access",
    EmergencyDetected => "emergency_detected",
    AssessmentGenerated => "assessment_generated",
    ConsultationUpdated => "consultation_updated",
});

str_enum!(AuditOutcome {
    Success => "success",
    Failure => "failure",
    Denied => "denied",
});

impl Role {
    /// Permissions granted to a role. Admin holds every permission.
    pub fn permissions(self) -> Vec<Permission> {
        match self {
            Self::Patient => vec![Permission::SubmitSymptoms, Permission::JoinConsultations],
            Self::Doctor => vec![
                Permission::JoinConsultations,
                Permission::ManageConsultations,
            ],
            Self::Admin => vec![
                Permission::SubmitSymptoms,
                Permission::JoinConsultations,
                Permission::ManageConsultations,
                Permission::ViewAuditLog,
            ],
        }
    }

    pub fn has_permission(self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn question_kind_round_trip() {
        for (variant, s) in [
            (QuestionKind::MultipleChoice, "multiple_choice"),
            (QuestionKind::YesNo, "yes_no"),
            (QuestionKind::Scale, "scale"),
            (QuestionKind::FreeText, "free_text"),
            (QuestionKind::Emergency, "emergency"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(QuestionKind::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&Gender::PreferNotToSay).unwrap();
        assert_eq!(json, "\"prefer_not_to_say\"");
        let parsed: QuestionKind = serde_json::from_str("\"yes_no\"").unwrap();
        assert_eq!(parsed, QuestionKind::YesNo);
    }

    #[test]
    fn invalid_enum_value_rejected() {
        let err = Role::from_str("superuser").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidEnum { .. }));
    }

    #[test]
    fn severity_max_keeps_higher() {
        assert_eq!(
            AssessmentSeverity::Low.max(AssessmentSeverity::High),
            AssessmentSeverity::High
        );
        assert_eq!(
            AssessmentSeverity::Emergency.max(AssessmentSeverity::Moderate),
            AssessmentSeverity::Emergency
        );
    }

    #[test]
    fn consultation_transitions() {
        use ConsultationStatus::*;
        assert!(Pending.can_transition_to(Active));
        assert!(Active.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Active));
        assert!(!Pending.can_transition_to(Completed));
        assert!(Cancelled.is_terminal());
    }

    #[test]
    fn only_clinical_roles_manage_consultations() {
        assert!(Role::Doctor.has_permission(Permission::ManageConsultations));
        assert!(Role::Admin.has_permission(Permission::ManageConsultations));
        assert!(!Role::Patient.has_permission(Permission::ManageConsultations));
    }

    #[test]
    fn only_admin_views_audit_log() {
        assert!(Role::Admin.permissions().contains(&Permission::ViewAuditLog));
        assert!(!Role::Doctor.permissions().contains(&Permission::ViewAuditLog));
        assert!(!Role::Patient.permissions().contains(&Permission::ViewAuditLog));
    }
}
