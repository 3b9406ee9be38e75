//! Controlled vocabulary shared by stored records and the API.
//!
//! Every enum serialises to the lowercase snake_case text used on the wire and on disk, so a
//! stored YAML record and a JSON response always agree on spelling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Error returned when text does not name a vocabulary term.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownTerm {
    pub vocabulary: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.vocabulary, self.value)
    }
}

impl std::error::Error for UnknownTerm {}

macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident ($label:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
        )]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            /// Every term, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub const fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownTerm;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|term| term.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| UnknownTerm {
                        vocabulary: $label,
                        value: s.to_string(),
                    })
            }
        }
    };
}

vocabulary! {
    /// Permissions granted to staff through roles.
    Permission ("permission") {
        ManageClinic => "manage_clinic",
        ManageRoles => "manage_roles",
        ManageStaff => "manage_staff",
        RegisterPatients => "register_patients",
        ViewPatients => "view_patients",
        ManageCamps => "manage_camps",
        ManageAppointments => "manage_appointments",
        ManageQueue => "manage_queue",
        RecordDiagnosis => "record_diagnosis",
        RecordTreatment => "record_treatment",
        RecordMammography => "record_mammography",
        RecordGeneralPhysician => "record_general_physician",
        ViewClinicalRecords => "view_clinical_records",
        UploadFiles => "upload_files",
        SendNotifications => "send_notifications",
        ViewAnalytics => "view_analytics",
    }
}

vocabulary! {
    ClinicStatus ("clinic status") {
        Active => "active",
        Suspended => "suspended",
    }
}

vocabulary! {
    UserStatus ("user status") {
        Active => "active",
        Disabled => "disabled",
    }
}

vocabulary! {
    Sex ("sex") {
        Female => "female",
        Male => "male",
        Other => "other",
    }
}

vocabulary! {
    /// Lifecycle of a health camp. Closed camps accept no new work.
    CampStatus ("camp status") {
        Planned => "planned",
        Active => "active",
        Closed => "closed",
    }
}

vocabulary! {
    AppointmentService ("appointment service") {
        GeneralPhysician => "general_physician",
        Mammography => "mammography",
        FollowUp => "follow_up",
        Consultation => "consultation",
    }
}

vocabulary! {
    AppointmentStatus ("appointment status") {
        Scheduled => "scheduled",
        CheckedIn => "checked_in",
        InProgress => "in_progress",
        Completed => "completed",
        Cancelled => "cancelled",
        NoShow => "no_show",
    }
}

vocabulary! {
    QueueStatus ("queue status") {
        Waiting => "waiting",
        Called => "called",
        Served => "served",
        Skipped => "skipped",
    }
}

vocabulary! {
    Severity ("severity") {
        Mild => "mild",
        Moderate => "moderate",
        Severe => "severe",
        Critical => "critical",
    }
}

vocabulary! {
    BreastSide ("breast side") {
        Left => "left",
        Right => "right",
        Bilateral => "bilateral",
    }
}

vocabulary! {
    /// BI-RADS breast density categories a to d.
    BreastDensity ("breast density") {
        A => "a",
        B => "b",
        C => "c",
        D => "d",
    }
}

vocabulary! {
    NotificationChannel ("notification channel") {
        Email => "email",
        Whatsapp => "whatsapp",
    }
}

vocabulary! {
    NotificationStatus ("notification status") {
        Sent => "sent",
        Failed => "failed",
        Skipped => "skipped",
    }
}
