//! Typed house profile for automatically priced domestic jobs.
//!
//! Labels are the ones shown to clients; parsing is case-insensitive and
//! accepts the unaccented spelling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HouseSize {
    OneBedroom,
    TwoBedrooms,
    ThreeToFourBedrooms,
    FivePlusBedrooms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomesticServiceType {
    Standard,
    Complete,
    PostConstruction,
    /// Single-task add-on: ironing.
    Ironing,
    /// Single-task add-on: window cleaning.
    Windows,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    OneOff,
}

/// Structured domestic job profile, validated at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomesticDetails {
    pub house_size: HouseSize,
    pub service_type: DomesticServiceType,
    pub frequency: Frequency,
}

/// Lowercase, trimmed, with Portuguese diacritics removed.
pub fn fold_text(label: &str) -> String {
    label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' => 'a',
            'é' | 'ê' => 'e',
            'í' => 'i',
            'ó' | 'ô' | 'õ' => 'o',
            'ú' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

impl HouseSize {
    pub fn label(&self) -> &'static str {
        match self {
            HouseSize::OneBedroom => "1 quarto",
            HouseSize::TwoBedrooms => "2 quartos",
            HouseSize::ThreeToFourBedrooms => "3-4 quartos",
            HouseSize::FivePlusBedrooms => "5+ quartos",
        }
    }
}

impl FromStr for HouseSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold_text(s).as_str() {
            "1 quarto" | "kitnet" | "one_bedroom" => Ok(HouseSize::OneBedroom),
            "2 quartos" | "two_bedrooms" => Ok(HouseSize::TwoBedrooms),
            "3-4 quartos" | "three_to_four_bedrooms" => Ok(HouseSize::ThreeToFourBedrooms),
            "5+ quartos" | "five_plus_bedrooms" => Ok(HouseSize::FivePlusBedrooms),
            _ => Err(format!("unknown house size: {}", s)),
        }
    }
}

impl DomesticServiceType {
    pub fn label(&self) -> &'static str {
        match self {
            DomesticServiceType::Standard => "padrao",
            DomesticServiceType::Complete => "completo",
            DomesticServiceType::PostConstruction => "pos-obra",
            DomesticServiceType::Ironing => "passar roupa",
            DomesticServiceType::Windows => "janelas",
        }
    }
}

impl FromStr for DomesticServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold_text(s).as_str() {
            "padrao" | "standard" => Ok(DomesticServiceType::Standard),
            "completo" | "complete" => Ok(DomesticServiceType::Complete),
            "pos-obra" | "pos obra" | "post_construction" => {
                Ok(DomesticServiceType::PostConstruction)
            }
            "passar roupa" | "ironing" => Ok(DomesticServiceType::Ironing),
            "janelas" | "windows" => Ok(DomesticServiceType::Windows),
            _ => Err(format!("unknown service type: {}", s)),
        }
    }
}

impl Frequency {
    pub fn label(&self) -> &'static str {
        match self {
            Frequency::Daily => "Diária",
            Frequency::Weekly => "Semanal",
            Frequency::Biweekly => "Quinzenal",
            Frequency::Monthly => "Mensal",
            Frequency::OneOff => "Única",
        }
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold_text(s).as_str() {
            "diaria" | "daily" => Ok(Frequency::Daily),
            "semanal" | "weekly" => Ok(Frequency::Weekly),
            "quinzenal" | "biweekly" => Ok(Frequency::Biweekly),
            "mensal" | "monthly" => Ok(Frequency::Monthly),
            "unica" | "avulsa" | "one_off" => Ok(Frequency::OneOff),
            _ => Err(format!("unknown frequency: {}", s)),
        }
    }
}

impl fmt::Display for DomesticDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} / {} / {}",
            self.house_size.label(),
            self.service_type.label(),
            self.frequency.label()
        )
    }
}
