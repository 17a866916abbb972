//! Closed vocabularies used by the forms. Every value serializes as the
//! Portuguese label shown to staff.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! labeled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                let trimmed = value.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|item| item.label() == trimmed)
                    .ok_or_else(|| format!("Valor inválido para {}: {trimmed}", stringify!($name)))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.label())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

labeled_enum!(Sex {
    Male => "Masculino",
    Female => "Feminino",
});

labeled_enum!(
    /// Nível de atenção: intensity tier of home care.
    CareLevel {
        AdI => "AD I",
        AdII => "AD II",
        AdIII => "AD III",
    }
);

labeled_enum!(PatientStatus {
    EligibilityReview => "Análise de Elegibilidade",
    Active => "Ativo",
    DischargedImproved => "Alta por Melhora",
    DischargedReferred => "Alta Administrativa com Encaminhamento",
    Deceased => "Óbito",
    Ineligible => "Inelegível",
});

labeled_enum!(CareType {
    Palliative => "Paliativo",
    Medication => "Medicação",
    WoundCare => "Curativo",
    Rehabilitation => "Reabilitação",
    Anticoagulation => "Anticoagulação",
});

labeled_enum!(
    /// Cargo: a staff member's professional role.
    Role {
        Nurse => "Enfermeiro",
        Physician => "Médico",
        NursingTechnician => "Técnico de Enfermagem",
        AdministrativeAssistant => "Assistente Administrativo",
        Nutritionist => "Nutricionista",
        Physiotherapist => "Fisioterapeuta",
        Psychologist => "Psicólogo",
        SocialWorker => "Assistente Social",
        Pharmacist => "Farmacêutico",
        Coordinator => "Coordenador",
        Manager => "Gerente",
        It => "TI",
    }
);

labeled_enum!(AccessLevel {
    Admin => "ADMIN",
    Standard => "Comum",
});

labeled_enum!(Page {
    Home => "Home",
    Patients => "Pacientes",
    Visits => "Atendimentos",
    Dashboard => "Dashboard",
    Reports => "Relatórios",
});

labeled_enum!(Modality {
    Telehealth => "Teleatendimento",
    WalkIn => "Demanda Espontânea",
    Scheduled => "Atendimento Programado",
    EligibilityReview => "Análise de Elegibilidade",
});

labeled_enum!(VisitStatus {
    InProgress => "Em Andamento",
    Completed => "Concluído",
    Cancelled => "Cancelado",
});

impl Default for PatientStatus {
    fn default() -> Self {
        PatientStatus::EligibilityReview
    }
}

impl Default for AccessLevel {
    fn default() -> Self {
        AccessLevel::Standard
    }
}

impl Default for VisitStatus {
    fn default() -> Self {
        VisitStatus::InProgress
    }
}
