//! Ensamblado de la máquina del pipeline a partir del punto de entrada y los
//! flags de la corrida.
//!
//! Lista maestra (en orden):
//! Remap -> Alignment -> HaplotypeCalling -> Genotyping -> VariantFiltering
//!   [-> DenovoCalling]
//!   [-> Handoff -> ClusterCreate -> ClusterJob -> ClusterDelete]
//!   -> PipelineSucceeded
//!
//! Cada etapa retenida aporta su sub-grafo de polling (5 estados) y el éxito
//! de una etapa encadena con el Submit de la siguiente.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{SpecError, SpecResult};
use crate::machine::StateMachine;
use crate::poll::AsyncPoller;
use crate::states::{Fail, State, Succeed, Task};
use crate::StateName;

/// Estado terminal común a todas las corridas.
pub const SUCCEEDED_STATE: &str = "PipelineSucceeded";

pub const DEFAULT_MACHINE_NAME: &str = "BatchPipeline";
pub const DEFAULT_POLL_WAIT_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Remap,
    Alignment,
    HaplotypeCalling,
    Genotyping,
    VariantFiltering,
    DenovoCalling,
    Handoff,
    ClusterCreate,
    ClusterJob,
    ClusterDelete,
}

impl Stage {
    pub const CORE: [Stage; 5] = [
        Stage::Remap,
        Stage::Alignment,
        Stage::HaplotypeCalling,
        Stage::Genotyping,
        Stage::VariantFiltering,
    ];

    pub const DENOVO: [Stage; 1] = [Stage::DenovoCalling];

    pub const CLUSTER_QC: [Stage; 4] = [
        Stage::Handoff,
        Stage::ClusterCreate,
        Stage::ClusterJob,
        Stage::ClusterDelete,
    ];

    pub const ALL: [Stage; 10] = [
        Stage::Remap,
        Stage::Alignment,
        Stage::HaplotypeCalling,
        Stage::Genotyping,
        Stage::VariantFiltering,
        Stage::DenovoCalling,
        Stage::Handoff,
        Stage::ClusterCreate,
        Stage::ClusterJob,
        Stage::ClusterDelete,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Remap => "Remap",
            Stage::Alignment => "Alignment",
            Stage::HaplotypeCalling => "HaplotypeCalling",
            Stage::Genotyping => "Genotyping",
            Stage::VariantFiltering => "VariantFiltering",
            Stage::DenovoCalling => "DenovoCalling",
            Stage::Handoff => "Handoff",
            Stage::ClusterCreate => "ClusterCreate",
            Stage::ClusterJob => "ClusterJob",
            Stage::ClusterDelete => "ClusterDelete",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Stage::Remap => "remap",
            Stage::Alignment => "alignment",
            Stage::HaplotypeCalling => "haplotype_calling",
            Stage::Genotyping => "genotyping",
            Stage::VariantFiltering => "variant_filtering",
            Stage::DenovoCalling => "denovo_calling",
            Stage::Handoff => "handoff",
            Stage::ClusterCreate => "cluster_create",
            Stage::ClusterJob => "cluster_job",
            Stage::ClusterDelete => "cluster_delete",
        }
    }

    pub fn submit_state(self) -> StateName {
        format!("{}Submit", self.label())
    }

    pub fn poll_state(self) -> StateName {
        format!("{}Poll", self.label())
    }

    pub fn wait_state(self) -> StateName {
        format!("{}Wait", self.label())
    }

    pub fn choice_state(self) -> StateName {
        format!("{}Choice", self.label())
    }

    pub fn fail_state(self) -> StateName {
        format!("{}Failed", self.label())
    }

    /// Ruta del contexto donde el poller deja el `Outcome` de la etapa.
    pub fn status_path(self) -> String {
        format!("$.{}_poll_status", self.key())
    }

    /// Entrada explícita del Task de envío, si la etapa la necesita.
    fn submit_input_path(self) -> Option<String> {
        match self {
            Stage::ClusterDelete => Some("$.cluster_delete.request".to_string()),
            _ => None,
        }
    }

    /// Dónde guarda el Task de envío su resultado (ids de unidades o el
    /// descriptor del cluster); el poller lo lee de ahí mismo.
    pub fn handle_path(self) -> String {
        match self {
            Stage::Handoff | Stage::ClusterCreate | Stage::ClusterJob => "$.gcp_info".to_string(),
            Stage::ClusterDelete => "$.cluster_delete.response".to_string(),
            _ => format!("$.{}_job_ids", self.key()),
        }
    }

    fn placeholder(self, role: &str) -> String {
        let label = self.label();
        let mut chars = label.chars();
        let head = chars
            .next()
            .map(|c| c.to_ascii_lowercase().to_string())
            .unwrap_or_default();
        format!("${{{}{}{}Resource}}", head, chars.as_str(), role)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Stage {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.key() == s)
            .ok_or_else(|| SpecError::UnknownStage(s.to_string()))
    }
}

/// Etapas en las que se puede (re)iniciar una corrida.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    Remap,
    Alignment,
    HaplotypeCalling,
    Genotyping,
    VariantFiltering,
    Handoff,
}

impl EntryPoint {
    pub const ALL: [EntryPoint; 6] = [
        EntryPoint::Remap,
        EntryPoint::Alignment,
        EntryPoint::HaplotypeCalling,
        EntryPoint::Genotyping,
        EntryPoint::VariantFiltering,
        EntryPoint::Handoff,
    ];

    pub fn stage(self) -> Stage {
        match self {
            EntryPoint::Remap => Stage::Remap,
            EntryPoint::Alignment => Stage::Alignment,
            EntryPoint::HaplotypeCalling => Stage::HaplotypeCalling,
            EntryPoint::Genotyping => Stage::Genotyping,
            EntryPoint::VariantFiltering => Stage::VariantFiltering,
            EntryPoint::Handoff => Stage::Handoff,
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stage().key())
    }
}

impl FromStr for EntryPoint {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntryPoint::ALL
            .iter()
            .copied()
            .find(|e| e.stage().key() == s)
            .ok_or_else(|| SpecError::InvalidEntryPoint {
                entry_point: s.to_string(),
                reason: format!(
                    "must be one of {}",
                    EntryPoint::ALL
                        .iter()
                        .map(|e| e.stage().key())
                        .collect::<Vec<_>>()
                        .join("|")
                ),
            })
    }
}

/// Flags de una corrida. Se fijan una vez al ensamblar y no cambian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineFlags {
    pub entry_point: EntryPoint,
    /// Los BAM de entrada tienen que re-mapearse a FASTQ primero.
    pub requires_remap: bool,
    /// Agrega la llamada de variantes de novo después del filtrado.
    pub call_denovos: bool,
    /// Agrega handoff + cluster de QC después del filtrado.
    pub cluster_qc: bool,
}

impl PipelineFlags {
    pub fn new(entry_point: EntryPoint) -> Self {
        Self {
            entry_point,
            requires_remap: false,
            call_denovos: false,
            cluster_qc: false,
        }
    }
}

/// Handles de recurso (lo que el ejecutor invoca) de una etapa.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResources {
    pub submit: String,
    pub poll: String,
}

/// Handles por etapa. Las etapas sin entrada usan placeholders `${...}` que
/// la capa de infraestructura sustituye más tarde.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceCatalog {
    entries: HashMap<Stage, StageResources>,
}

impl ResourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, stage: Stage, resources: StageResources) -> Self {
        self.entries.insert(stage, resources);
        self
    }

    /// Lee un JSON `{"<stage_key>": {"submit": "...", "poll": "..."}}`.
    pub fn from_json(raw: &str) -> SpecResult<Self> {
        let parsed: HashMap<String, StageResources> =
            serde_json::from_str(raw).map_err(|e| SpecError::InvalidResources(e.to_string()))?;

        let mut catalog = Self::new();
        for (key, resources) in parsed {
            let stage: Stage = key.parse()?;
            catalog.entries.insert(stage, resources);
        }
        Ok(catalog)
    }

    pub fn resolve(&self, stage: Stage) -> StageResources {
        self.entries
            .get(&stage)
            .cloned()
            .unwrap_or_else(|| StageResources {
                submit: stage.placeholder("Submit"),
                poll: stage.placeholder("Poll"),
            })
    }
}

/// Etapas retenidas, en orden, para unos flags dados.
pub fn plan(flags: &PipelineFlags) -> SpecResult<Vec<Stage>> {
    let mut all: Vec<Stage> = Stage::CORE.to_vec();
    if flags.call_denovos {
        all.extend(Stage::DENOVO);
    }
    if flags.cluster_qc {
        all.extend(Stage::CLUSTER_QC);
    }

    let entry = flags.entry_point.stage();
    let start = all
        .iter()
        .position(|s| *s == entry)
        .ok_or_else(|| SpecError::InvalidEntryPoint {
            entry_point: flags.entry_point.to_string(),
            reason: "stage is not part of this run (enable the cluster QC branch)".to_string(),
        })?;

    Ok(all[start..]
        .iter()
        .copied()
        .filter(|s| *s != Stage::Remap || flags.requires_remap)
        .collect())
}

/// Construye la máquina completa de una corrida.
#[derive(Debug, Clone)]
pub struct PipelineAssembler {
    name: String,
    flags: PipelineFlags,
    wait_seconds: u64,
    resources: ResourceCatalog,
}

impl PipelineAssembler {
    pub fn new(flags: PipelineFlags) -> Self {
        Self {
            name: DEFAULT_MACHINE_NAME.to_string(),
            flags,
            wait_seconds: DEFAULT_POLL_WAIT_SECS,
            resources: ResourceCatalog::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn wait_seconds(mut self, secs: u64) -> Self {
        self.wait_seconds = secs;
        self
    }

    pub fn resources(mut self, resources: ResourceCatalog) -> Self {
        self.resources = resources;
        self
    }

    pub fn flags(&self) -> &PipelineFlags {
        &self.flags
    }

    /// Todo o nada: o devuelve una máquina cerrada o un error de
    /// construcción, sin efectos laterales.
    pub fn assemble(&self) -> SpecResult<StateMachine> {
        let stages = plan(&self.flags)?;
        debug!(
            "ensamblando {} con etapas [{}]",
            self.name,
            stages.iter().map(|s| s.key()).collect::<Vec<_>>().join(", ")
        );

        let pollers = stages
            .iter()
            .enumerate()
            .map(|(i, stage)| {
                let success_next = stages
                    .get(i + 1)
                    .map(|next| next.submit_state())
                    .unwrap_or_else(|| SUCCEEDED_STATE.to_string());
                self.stage_poller(*stage, success_next)
            })
            .collect::<SpecResult<Vec<AsyncPoller>>>()?;

        let start = match pollers.first() {
            Some(first) => first.entry().to_string(),
            None => {
                return Err(SpecError::InvalidEntryPoint {
                    entry_point: self.flags.entry_point.to_string(),
                    reason: "no stages left to run".to_string(),
                })
            }
        };

        let mut states: Vec<State> = Vec::with_capacity(pollers.len() * 5 + 1);
        for poller in pollers {
            states.extend(poller.states()?);
        }
        states.push(Succeed::new(SUCCEEDED_STATE).into());

        StateMachine::new(self.name.clone(), start, states)
    }

    fn stage_poller(&self, stage: Stage, success_next: StateName) -> SpecResult<AsyncPoller> {
        let resources = self.resources.resolve(stage);

        let mut submit = Task::builder(stage.submit_state(), resources.submit)
            .result_path(stage.handle_path())
            .next(stage.poll_state());
        if let Some(input) = stage.submit_input_path() {
            submit = submit.input_path(input);
        }

        let poll = Task::builder(stage.poll_state(), resources.poll)
            .input_path(stage.handle_path())
            .result_path(stage.status_path());

        let fail = Fail::new(stage.fail_state())
            .with_error(format!("{}Failed", stage.label()))
            .with_cause(format!("one or more {} units failed", stage.key()));

        Ok(AsyncPoller::new(
            submit.build()?,
            poll,
            fail,
            success_next,
            stage.status_path(),
            self.wait_seconds,
        )
        .with_names(stage.wait_state(), stage.choice_state()))
    }
}

/// Payload de entrada de la ejecución, al lado de la definición.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInput {
    pub start_point: EntryPoint,
    pub flags: PipelineFlags,
    pub stages: Vec<Stage>,
    /// Datos específicos de la corrida; se pasan sin interpretar.
    pub context: Value,
}

impl PipelineInput {
    pub fn new(flags: PipelineFlags, context: Value) -> SpecResult<Self> {
        Ok(Self {
            start_point: flags.entry_point,
            stages: plan(&flags)?,
            flags,
            context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn all_flag_combinations() -> Vec<PipelineFlags> {
        let mut out = Vec::new();
        for entry_point in EntryPoint::ALL {
            for bits in 0..8u8 {
                out.push(PipelineFlags {
                    entry_point,
                    requires_remap: bits & 1 != 0,
                    call_denovos: bits & 2 != 0,
                    cluster_qc: bits & 4 != 0,
                });
            }
        }
        out
    }

    fn successor(machine: &StateMachine, state: &str) -> Value {
        machine
            .state(state)
            .map(State::build)
            .unwrap_or(Value::Null)
    }

    #[test]
    fn remap_sin_requerirse_arranca_en_alignment() {
        let flags = PipelineFlags::new(EntryPoint::Remap);
        let machine = PipelineAssembler::new(flags).assemble().unwrap();

        assert_eq!(machine.start_at(), "AlignmentSubmit");
        assert!(machine.states().iter().all(|s| !s.name().starts_with("Remap")));

        let succeeds: Vec<&State> = machine
            .states()
            .iter()
            .filter(|s| matches!(s, State::Succeed(_)))
            .collect();
        assert_eq!(succeeds.len(), 1);
        assert_eq!(succeeds[0].name(), SUCCEEDED_STATE);

        let choice = successor(&machine, "VariantFilteringChoice");
        assert_eq!(choice["Choices"][1]["Next"], json!(SUCCEEDED_STATE));
    }

    #[test]
    fn remap_requerido_arranca_en_remap() {
        let mut flags = PipelineFlags::new(EntryPoint::Remap);
        flags.requires_remap = true;
        let machine = PipelineAssembler::new(flags).assemble().unwrap();
        assert_eq!(machine.start_at(), "RemapSubmit");
        assert_eq!(
            successor(&machine, "RemapChoice")["Choices"][1]["Next"],
            json!("AlignmentSubmit")
        );
    }

    #[test]
    fn denovo_se_inserta_despues_del_filtrado() {
        let mut flags = PipelineFlags::new(EntryPoint::Remap);
        flags.call_denovos = true;
        let plain = PipelineAssembler::new(PipelineFlags::new(EntryPoint::Remap))
            .assemble()
            .unwrap();
        let machine = PipelineAssembler::new(flags).assemble().unwrap();

        assert_eq!(machine.states().len(), plain.states().len() + 5);
        assert_eq!(
            successor(&machine, "VariantFilteringChoice")["Choices"][1]["Next"],
            json!("DenovoCallingSubmit")
        );
        assert_eq!(
            successor(&machine, "DenovoCallingChoice")["Choices"][1]["Next"],
            json!(SUCCEEDED_STATE)
        );
    }

    #[test]
    fn cluster_qc_encadena_handoff_y_cluster() {
        let mut flags = PipelineFlags::new(EntryPoint::VariantFiltering);
        flags.cluster_qc = true;
        let stages = plan(&flags).unwrap();
        assert_eq!(
            stages,
            vec![
                Stage::VariantFiltering,
                Stage::Handoff,
                Stage::ClusterCreate,
                Stage::ClusterJob,
                Stage::ClusterDelete
            ]
        );

        let machine = PipelineAssembler::new(flags).assemble().unwrap();
        assert_eq!(
            successor(&machine, "VariantFilteringChoice")["Choices"][1]["Next"],
            json!("HandoffSubmit")
        );
        assert_eq!(
            successor(&machine, "ClusterDeleteChoice")["Choices"][1]["Next"],
            json!(SUCCEEDED_STATE)
        );
        assert_eq!(
            successor(&machine, "ClusterDeleteSubmit")["InputPath"],
            json!("$.cluster_delete.request")
        );
    }

    #[test]
    fn ambas_ramas_corren_denovo_antes_del_handoff() {
        let flags = PipelineFlags {
            entry_point: EntryPoint::Genotyping,
            requires_remap: true,
            call_denovos: true,
            cluster_qc: true,
        };
        assert_eq!(
            plan(&flags).unwrap(),
            vec![
                Stage::Genotyping,
                Stage::VariantFiltering,
                Stage::DenovoCalling,
                Stage::Handoff,
                Stage::ClusterCreate,
                Stage::ClusterJob,
                Stage::ClusterDelete
            ]
        );
    }

    #[test]
    fn handoff_sin_cluster_qc_es_entry_point_invalido() {
        let flags = PipelineFlags::new(EntryPoint::Handoff);
        assert!(matches!(
            PipelineAssembler::new(flags).assemble(),
            Err(SpecError::InvalidEntryPoint { .. })
        ));
    }

    #[test]
    fn entry_point_desconocido_falla_al_parsear() {
        assert!(matches!(
            "fastq".parse::<EntryPoint>(),
            Err(SpecError::InvalidEntryPoint { .. })
        ));
        assert_eq!("haplotype_calling".parse::<EntryPoint>(), Ok(EntryPoint::HaplotypeCalling));
    }

    #[test]
    fn toda_combinacion_legal_produce_un_grafo_cerrado() {
        for flags in all_flag_combinations() {
            let result = PipelineAssembler::new(flags).assemble();
            if flags.entry_point == EntryPoint::Handoff && !flags.cluster_qc {
                assert!(result.is_err(), "{flags:?}");
                continue;
            }
            let machine = result.unwrap_or_else(|e| panic!("{flags:?}: {e}"));
            let stages = plan(&flags).unwrap();

            assert_eq!(machine.states().len(), stages.len() * 5 + 1, "{flags:?}");
            assert!(machine.validate().is_ok());

            // un Fail por etapa, ninguno compartido
            let fails: HashSet<&str> = machine
                .states()
                .iter()
                .filter(|s| matches!(s, State::Fail(_)))
                .map(State::name)
                .collect();
            assert_eq!(fails.len(), stages.len());

            // el único estado sin aristas entrantes es el inicio
            let referenced: HashSet<&str> = machine
                .states()
                .iter()
                .flat_map(|s| s.successors())
                .collect();
            let roots: Vec<&str> = machine
                .states()
                .iter()
                .map(State::name)
                .filter(|n| !referenced.contains(n))
                .collect();
            assert_eq!(roots, vec![machine.start_at()], "{flags:?}");
        }
    }

    #[test]
    fn placeholders_y_catalogo_de_recursos() {
        let placeholder = ResourceCatalog::new().resolve(Stage::HaplotypeCalling);
        assert_eq!(placeholder.submit, "${haplotypeCallingSubmitResource}");
        assert_eq!(placeholder.poll, "${haplotypeCallingPollResource}");

        let catalog = ResourceCatalog::from_json(
            r#"{"alignment": {"submit": "arn:align", "poll": "arn:batch-poller"}}"#,
        )
        .unwrap();
        let machine = PipelineAssembler::new(PipelineFlags::new(EntryPoint::Alignment))
            .resources(catalog)
            .wait_seconds(15)
            .assemble()
            .unwrap();

        assert_eq!(successor(&machine, "AlignmentSubmit")["Resource"], json!("arn:align"));
        assert_eq!(successor(&machine, "AlignmentPoll")["Resource"], json!("arn:batch-poller"));
        assert_eq!(successor(&machine, "AlignmentWait")["Seconds"], json!(15));
    }

    #[test]
    fn catalogo_con_etapa_desconocida_es_error() {
        let err = ResourceCatalog::from_json(r#"{"qc": {"submit": "a", "poll": "b"}}"#).unwrap_err();
        assert_eq!(err, SpecError::UnknownStage("qc".to_string()));
    }

    #[test]
    fn catalogo_mal_formado_es_error_de_recursos() {
        let err = ResourceCatalog::from_json(r#"{"alignment": "arn:align"}"#).unwrap_err();
        assert!(matches!(err, SpecError::InvalidResources(_)), "got {err:?}");

        let err = ResourceCatalog::from_json("no es json").unwrap_err();
        assert!(matches!(err, SpecError::InvalidResources(_)));
    }

    #[test]
    fn input_lleva_flags_y_etapas() {
        let flags = PipelineFlags::new(EntryPoint::Genotyping);
        let input = PipelineInput::new(flags, json!({"cohort": "demo"})).unwrap();
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["start_point"], json!("genotyping"));
        assert_eq!(value["stages"], json!(["genotyping", "variant_filtering"]));
        assert_eq!(value["context"]["cohort"], json!("demo"));
    }
}
