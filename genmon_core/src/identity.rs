//! Controller identification and the model tables.

use crate::decode::reg_u16;
use crate::store::RegisterView;
use genmon_config::ControllerCfg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Identity {
    pub evolution: bool,
    pub liquid_cooled: bool,
}

impl Identity {
    pub const fn new(evolution: bool, liquid_cooled: bool) -> Self {
        Self {
            evolution,
            liquid_cooled,
        }
    }

    pub const fn is_evo_lc(self) -> bool {
        self.evolution && self.liquid_cooled
    }

    pub const fn is_evo_ac(self) -> bool {
        self.evolution && !self.liquid_cooled
    }

    pub const fn is_nexus_lc(self) -> bool {
        !self.evolution && self.liquid_cooled
    }

    pub const fn is_nexus_ac(self) -> bool {
        !self.evolution && !self.liquid_cooled
    }

    /// Name of the controller as configured or detected.
    pub fn configured_name(self) -> String {
        let family = if self.evolution { "Evolution, " } else { "Nexus, " };
        let cooling = if self.liquid_cooled {
            "Liquid Cooled"
        } else {
            "Air Cooled"
        };
        format!("{family}{cooling}")
    }
}

/// Operator notice raised when register 0000 holds an unverified code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionWarning {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub identity: Identity,
    pub warnings: Vec<DetectionWarning>,
    /// Nexus controllers only accept the indexed exercise write.
    pub force_legacy_write: bool,
}

const UNVERIFIED_BODY: &str = "\nThe monitor found a controller code it has not been validated against \
and made a best-effort guess at the controller type, which may be wrong. \
Please report the output of \"generator: registers\" together with the generator \
model number so the code can be added to the known list.";

/// Decide the controller family from the product code in register 0000.
///
/// `code` is `None` when the register could not be read; it is then treated
/// as code 0. Config overrides win over detection.
pub fn detect(
    code: Option<u16>,
    evolution_override: Option<bool>,
    liquid_override: Option<bool>,
    site: &str,
) -> Detection {
    let code = code.unwrap_or(0);
    let mut warnings = Vec::new();

    let evolution = if let Some(evo) = evolution_override {
        tracing::info!(evolution = evo, "controller family overridden by config");
        evo
    } else {
        match code {
            0x03 | 0x06 => false,
            0x09 | 0x0c => true,
            other => {
                tracing::warn!(code = %format!("{other:04x}"), "unverified controller code (family)");
                warnings.push(DetectionWarning {
                    subject: format!("Generator Monitor (Nexus / Evolution): Warning at {site}"),
                    body: UNVERIFIED_BODY.to_string(),
                });
                other > 0x06
            }
        }
    };

    let liquid_cooled = if let Some(lc) = liquid_override {
        tracing::info!(liquid_cooled = lc, "cooling overridden by config");
        lc
    } else {
        match code {
            0x03 | 0x09 => false,
            0x06 | 0x0c => true,
            other => {
                tracing::warn!(code = %format!("{other:04x}"), "unverified controller code (cooling)");
                warnings.push(DetectionWarning {
                    subject: format!("Generator Monitor (liquid / air cooled: Warning at {site}"),
                    body: UNVERIFIED_BODY.to_string(),
                });
                false
            }
        }
    };

    Detection {
        identity: Identity::new(evolution, liquid_cooled),
        warnings,
        force_legacy_write: !evolution,
    }
}

/// Controller as reported by register 0000; empty when not yet read.
pub fn controller_name(view: &impl RegisterView) -> String {
    let Some(code) = reg_u16(view, 0x0000) else {
        return String::new();
    };
    match code {
        0x03 => "Nexus, Air Cooled".to_string(),
        0x06 => "Nexus, Liquid Cooled".to_string(),
        0x09 => "Evolution, Air Cooled".to_string(),
        0x0c => "Evolution, Liquid Cooled".to_string(),
        other => format!("Unknown 0x{other:02X}"),
    }
}

/// One row of a model table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRow {
    pub rating: &'static str,
    pub hertz: &'static str,
    pub voltage: &'static str,
    pub phase: &'static str,
}

const fn row(
    rating: &'static str,
    hertz: &'static str,
    voltage: &'static str,
    phase: &'static str,
) -> ModelRow {
    ModelRow {
        rating,
        hertz,
        voltage,
        phase,
    }
}

const NEXUS_AC_MODELS: &[(u16, ModelRow)] = &[
    (0, row("8KW", "60", "120/240", "1")),
    (2, row("14KW", "60", "120/240", "1")),
    (4, row("20KW", "60", "120/240", "1")),
];

const EVO_AC_MODELS: &[(u16, ModelRow)] = &[
    (1, row("9KW", "60", "120/240", "1")),
    (2, row("14KW", "60", "120/240", "1")),
    (3, row("17KW", "60", "120/240", "1")),
    (4, row("20KW", "60", "120/240", "1")),
    (5, row("8KW", "60", "120/240", "1")),
    (7, row("13KW", "60", "120/240", "1")),
    (8, row("15KW", "60", "120/240", "1")),
    (9, row("16KW", "60", "120/240", "1")),
    (10, row("20KW", "VSCF", "120/240", "1")),
    (11, row("15KW", "ECOVSCF", "120/240", "1")),
    (12, row("8KVA", "50", "220,230,240", "1")),
    (13, row("10KVA", "50", "220,230,240", "1")),
    (14, row("13KVA", "50", "220,230,240", "1")),
    (15, row("11KW", "60", "240", "1")),
    (17, row("22KW", "60", "120/240", "1")),
    (21, row("11KW", "60", "240 LS", "1")),
    (32, row("Trinity", "60", "208 3Phase", "3")),
    (33, row("Trinity", "50", "380,400,416", "3")),
];

const EVO_LC_MODELS: &[(u16, ModelRow)] = &[(13, row("48KW", "60", "120/240", "1"))];

/// Look up the model-id register for this controller.
///
/// Nexus liquid cooled controllers have no model table.
pub fn model_row(id: Identity, view: &impl RegisterView) -> Option<ModelRow> {
    let (register, table) = if !id.liquid_cooled {
        (
            0x0019,
            if id.evolution {
                EVO_AC_MODELS
            } else {
                NEXUS_AC_MODELS
            },
        )
    } else if id.evolution {
        (0x005c, EVO_LC_MODELS)
    } else {
        return None;
    };
    let model_id = reg_u16(view, register)?;
    table
        .iter()
        .find(|(k, _)| *k == model_id)
        .map(|(_, r)| *r)
}

/// Nominal frequency from the model table, only for plain 50/60 Hz rows.
pub fn model_frequency(id: Identity, view: &impl RegisterView) -> Option<u32> {
    let r = model_row(id, view)?;
    match r.hertz {
        "60" => Some(60),
        "50" => Some(50),
        _ => None,
    }
}

/// Rated kW (or kVA) from the model table.
pub fn model_kw(id: Identity, view: &impl RegisterView) -> Option<u32> {
    let r = model_row(id, view)?;
    let upper = r.rating.to_ascii_uppercase();
    if !upper.contains("KW") && !upper.contains("KVA") {
        return None;
    }
    let digits: String = r.rating.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDefaults {
    pub model: String,
    pub nominal_kw: u32,
    pub nominal_rpm: u32,
    pub nominal_frequency: u32,
    pub fuel_type: String,
}

impl Default for ModelDefaults {
    fn default() -> Self {
        Self {
            model: "Unknown".to_string(),
            nominal_kw: 0,
            nominal_rpm: 0,
            nominal_frequency: 60,
            fuel_type: "Unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDefaults {
    pub defaults: ModelDefaults,
    /// The model-id register did not match any table row.
    pub model_id_unknown: bool,
}

/// Fill in nominal ratings the config leaves open, from the model tables
/// and the controller family.
pub fn resolve_defaults(
    id: Identity,
    view: &impl RegisterView,
    cfg: &ControllerCfg,
) -> ResolvedDefaults {
    let nominal_frequency = cfg
        .nominal_frequency
        .or_else(|| model_frequency(id, view))
        .unwrap_or(60);

    let nominal_rpm = cfg.nominal_rpm.unwrap_or(match (id.liquid_cooled, nominal_frequency) {
        (true, 50) => 1500,
        (true, _) => 1800,
        (false, 50) => 3000,
        (false, _) => 3600,
    });

    let table_kw = model_kw(id, view);
    let model_id_unknown = table_kw.is_none();

    let generic_kw = if id.liquid_cooled { 60 } else { 22 };
    let nominal_kw = cfg.nominal_kw.or(table_kw).unwrap_or(generic_kw);
    let model = cfg.model.clone().unwrap_or_else(|| {
        if id.liquid_cooled {
            "Generic Liquid Cooled".to_string()
        } else {
            "Generic Air Cooled".to_string()
        }
    });

    let fuel_type = cfg.fuel_type.clone().unwrap_or_else(|| {
        if model.starts_with("RD") {
            "Diesel"
        } else if model.starts_with("RG") || model.starts_with("QT") {
            "Natural Gas"
        } else if id.is_evo_lc() {
            "Diesel"
        } else {
            "Natural Gas"
        }
        .to_string()
    });

    ResolvedDefaults {
        defaults: ModelDefaults {
            model,
            nominal_kw,
            nominal_rpm,
            nominal_frequency,
            fuel_type,
        },
        model_id_unknown,
    }
}
