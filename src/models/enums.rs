use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a string does not name a known variant of a closed vocabulary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {field} value: '{value}'")]
pub struct InvalidEnum {
    pub field: String,
    pub value: String,
}

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            pub fn all() -> &'static [$name] {
                &[$(Self::$variant),+]
            }
        }

        impl std::str::FromStr for $name {
            type Err = InvalidEnum;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(InvalidEnum {
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

/// Same as `str_enum!` but keeps unrecognized model output as `Other(..)`
/// instead of rejecting it. Serialized as the bare string.
macro_rules! open_str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            pub fn as_str(&self) -> &str {
                match self {
                    $(Self::$variant => $s,)+
                    Self::Other(s) => s.as_str(),
                }
            }

            pub fn is_known(&self) -> bool {
                !matches!(self, Self::Other(_))
            }

            pub fn known() -> Vec<$name> {
                vec![$(Self::$variant),+]
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                match s.trim() {
                    $($s => Self::$variant,)+
                    _ => Self::Other(s),
                }
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::from(s.to_string())
            }
        }

        impl From<$name> for String {
            fn from(v: $name) -> Self {
                v.as_str().to_string()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(
    /// Coastal ecosystem classification.
    Habitat {
        Manguezal => "manguezal",
        Restinga => "restinga",
        MataAtlantica => "mata_atlantica",
        Dunas => "dunas",
        Praia => "praia",
        CostaoRochoso => "costao_rochoso",
        Estuario => "estuario",
        Laguna => "laguna",
        AreaUrbana => "area_urbana",
        Rio => "rio",
        Serra => "serra",
        Ilhas => "ilhas",
        Baia => "baia",
        AmbienteMarinho => "ambiente_marinho",
    }
);

str_enum!(
    /// Human activities the raw pass may report.
    ActivityType {
        PescaArtesanal => "pesca_artesanal",
        PescaIndustrial => "pesca_industrial",
        Maricultura => "maricultura",
        PesquisaCientifica => "pesquisa_cientifica",
        Turismo => "turismo",
        Navegacao => "navegacao",
        Construcao => "construcao",
        Desmatamento => "desmatamento",
        RecuperacaoAmbiental => "recuperacao_ambiental",
    }
);

str_enum!(
    /// Rank at which an identification is asserted.
    TaxonomyLevel {
        Species => "species",
        Genus => "genus",
        Family => "family",
        Order => "order",
        Class => "class",
    }
);

impl TaxonomyLevel {
    /// Lenient parse used during assembly: unknown or empty values fall back
    /// to `Species`.
    pub fn parse_lenient(s: &str) -> Self {
        s.trim()
            .to_lowercase()
            .parse()
            .unwrap_or(TaxonomyLevel::Species)
    }
}

/// Where a processed image came from. Serialized names match the manifests
/// written by earlier versions of the tagger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceTag {
    #[serde(rename = "lightroom")]
    FirstPartyArchive,
    #[serde(rename = "drive")]
    CloudStorage,
    #[serde(rename = "colaborador")]
    Contributor,
}

impl SourceTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FirstPartyArchive => "lightroom",
            Self::CloudStorage => "drive",
            Self::Contributor => "colaborador",
        }
    }

    /// Cloud items are keyed by a remote id, everything else by file path.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::CloudStorage)
    }
}

impl std::str::FromStr for SourceTag {
    type Err = InvalidEnum;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lightroom" => Ok(Self::FirstPartyArchive),
            "drive" => Ok(Self::CloudStorage),
            "colaborador" | "contributor" => Ok(Self::Contributor),
            _ => Err(InvalidEnum {
                field: "SourceTag".into(),
                value: s.into(),
            }),
        }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

open_str_enum!(
    /// Evidence of possible pre-colonial human occupation.
    ArchaeologyFlag {
        PossibleSambaqui => "possible_sambaqui",
        ShellMound => "shell_mound",
        ShellAccumulation => "shell_accumulation",
        CeramicFragment => "ceramic_fragment",
        LithicMaterial => "lithic_material",
        AnthropogenicDeposit => "anthropogenic_deposit",
        ShellMiddens => "shell_middens",
        ArchaeologicalSite => "archaeological_site",
    }
);

open_str_enum!(
    /// Photographic quality reported by the raw pass.
    TechnicalQuality {
        Sharp => "sharp",
        SlightlyBlurred => "slightly_blurred",
        Blurred => "blurred",
        Underexposed => "underexposed",
        Overexposed => "overexposed",
        GoodExposure => "good_exposure",
    }
);
