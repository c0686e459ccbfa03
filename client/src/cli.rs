use std::fs;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use common::{
    plan, EntryPoint, PipelineAssembler, PipelineFlags, PipelineInput, ResourceCatalog, Stage,
    StatusOverrideRequest, SubmitRequest, UnitId, UnitInfo, UnitStatus,
};
use poller::{
    tracker_base_url, BatchStatusPoller, HttpTracker, PollConfig, PollError, StageReport,
    WorkSubmitter,
};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Arma máquinas de estado de pipelines batch y sigue sus etapas")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Imprime la definición de la máquina de estados
    Build {
        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Segundos entre chequeos de cada etapa
        #[arg(long, default_value_t = common::pipeline::DEFAULT_POLL_WAIT_SECS)]
        wait_seconds: u64,

        /// JSON con los handles {submit, poll} por etapa
        #[arg(long, value_name = "ARCHIVO")]
        resources: Option<String>,

        #[arg(long, default_value = common::pipeline::DEFAULT_MACHINE_NAME)]
        name: String,

        /// Contexto de la corrida (JSON); agrega el payload de entrada
        #[arg(long, value_name = "CONTEXT_JSON")]
        input: Option<String>,
    },
    /// Imprime las etapas que correrían, en orden
    Plan {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },
    /// Encola unidades de una etapa en el tracker
    Submit {
        #[arg(long)]
        stage: Stage,

        #[arg(long)]
        units: u32,

        #[arg(long, default_value = "default")]
        job_definition: String,

        #[arg(long, value_name = "JOB_ID", num_args = 1..)]
        depends_on: Vec<UnitId>,
    },
    /// Un chequeo del estado de un conjunto de unidades
    Status {
        #[arg(value_name = "JOB_ID", required = true)]
        ids: Vec<UnitId>,
    },
    /// Espera a que la etapa termine; sale con error si falla
    Wait {
        #[arg(long)]
        stage: Stage,

        #[arg(value_name = "JOB_ID", required = true)]
        ids: Vec<UnitId>,
    },
    /// Muestra el registro completo de una unidad
    Show {
        #[arg(value_name = "JOB_ID")]
        id: UnitId,
    },
    /// Fija el estado de una unidad (p.ej. FAILED para probar la rama de fallo)
    Pin {
        #[arg(value_name = "JOB_ID")]
        id: UnitId,

        #[arg(value_name = "STATUS")]
        status: UnitStatus,
    },
}

#[derive(Args, Debug, Clone)]
struct PipelineArgs {
    /// Etapa donde arranca la corrida
    #[arg(long)]
    entry_point: EntryPoint,

    #[arg(long)]
    requires_remap: bool,

    #[arg(long)]
    call_denovos: bool,

    #[arg(long)]
    cluster_qc: bool,
}

impl PipelineArgs {
    fn flags(&self) -> PipelineFlags {
        PipelineFlags {
            entry_point: self.entry_point,
            requires_remap: self.requires_remap,
            call_denovos: self.call_denovos,
            cluster_qc: self.cluster_qc,
        }
    }
}

/// Definición (y payload de entrada si hay contexto) como JSON.
fn render_build(
    assembler: &PipelineAssembler,
    context: Option<&str>,
) -> Result<Value> {
    let machine = assembler.assemble()?;

    let Some(raw) = context else {
        return Ok(machine.build());
    };
    let context: Value = serde_json::from_str(raw).context("--input no es JSON válido")?;
    let input = PipelineInput::new(*assembler.flags(), context)?;

    Ok(json!({
        "definition": machine.build(),
        "input": input,
    }))
}

fn render_plan(flags: &PipelineFlags) -> Result<Vec<String>> {
    Ok(plan(flags)?
        .iter()
        .enumerate()
        .map(|(i, stage)| format!("{}. {} ({})", i + 1, stage.key(), stage.submit_state()))
        .collect())
}

fn print_report(report: &StageReport) {
    println!("{}", report.outcome);
    for unit in &report.units {
        println!("  {}  {}", unit.job_id, unit.status);
    }
}

fn status_poller() -> Result<BatchStatusPoller<HttpTracker>> {
    let config = PollConfig::from_env();
    let tracker = HttpTracker::from_config(&config)?;
    Ok(BatchStatusPoller::new(tracker, config))
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            pipeline,
            wait_seconds,
            resources,
            name,
            input,
        } => {
            let catalog = match resources {
                Some(path) => {
                    let raw = fs::read_to_string(&path)
                        .with_context(|| format!("leyendo recursos de {path}"))?;
                    ResourceCatalog::from_json(&raw)?
                }
                None => ResourceCatalog::new(),
            };

            let assembler = PipelineAssembler::new(pipeline.flags())
                .name(name)
                .wait_seconds(wait_seconds)
                .resources(catalog);

            let doc = render_build(&assembler, input.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Commands::Plan { pipeline } => {
            for line in render_plan(&pipeline.flags())? {
                println!("{line}");
            }
        }
        Commands::Submit {
            stage,
            units,
            job_definition,
            depends_on,
        } => {
            let tracker = HttpTracker::from_env()?;
            let ids = tracker
                .submit(&SubmitRequest {
                    stage,
                    job_definition,
                    units,
                    depends_on,
                })
                .await?;

            info!("{} unidades de {} encoladas", ids.len(), stage);
            for id in ids {
                println!("{id}");
            }
        }
        Commands::Status { ids } => {
            let poller = status_poller()?;
            let report = poller.check(&ids).await?;
            print_report(&report);
        }
        Commands::Wait { stage, ids } => {
            let poller = status_poller()?;
            match poller.wait_for_stage(stage.key(), &ids).await {
                Ok(report) => print_report(&report),
                Err(PollError::StageFailed { stage, failed }) => {
                    println!("{}", common::Outcome::Fail);
                    for unit in &failed {
                        println!("  {}  {}", unit.job_id, unit.status);
                    }
                    bail!("la etapa {stage} falló ({} unidades)", failed.len());
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Show { id } => {
            let url = format!("{}/api/v1/jobs/{id}", tracker_base_url());
            let resp = Client::new().get(&url).send().await?;

            if resp.status().is_success() {
                let unit: UnitInfo = resp.json().await?;
                println!("Unidad:");
                println!("  id: {}", unit.job_id);
                println!("  etapa: {}", unit.stage);
                println!("  definición: {}", unit.job_definition);
                println!("  estado: {}{}", unit.status, if unit.pinned { " (fijado)" } else { "" });
                if !unit.depends_on.is_empty() {
                    println!("  depende de: {}", unit.depends_on.join(", "));
                }
                println!("  encolada: {}", unit.submitted_at);
                println!("  actualizada: {}", unit.updated_at);
            } else {
                bail!("no se encontró la unidad {id} ({})", resp.status());
            }
        }
        Commands::Pin { id, status } => {
            let url = format!("{}/api/v1/jobs/{id}/status", tracker_base_url());
            let resp = Client::new()
                .post(&url)
                .json(&StatusOverrideRequest { status })
                .send()
                .await?;

            if !resp.status().is_success() {
                bail!("el tracker rechazó el cambio ({})", resp.status());
            }
            let unit: UnitInfo = resp.json().await?;
            println!("{} -> {}", unit.job_id, unit.status);
        }
    }

    Ok(())
}
