use clap::Parser;
use pose::{
    LandmarkVariant, PipelineConfig, PipelineMode, PosePipeline, backend::ort::OrtBackend,
    load_image, logging::init_observability,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Detect people and their body landmarks in an image, printed as JSON.
#[derive(Parser, Debug)]
#[command(name = "pose", version)]
struct Args {
    /// Image to analyse (JPEG or PNG)
    #[arg(long)]
    image: PathBuf,

    /// Skip the landmark stage
    #[arg(long)]
    boxes_only: bool,

    #[arg(long)]
    confidence: Option<f64>,

    #[arg(long)]
    iou: Option<f64>,

    #[arg(long)]
    max_detections: Option<usize>,

    #[arg(long)]
    pool_size: Option<usize>,

    /// Landmark model variant: lite, full or heavy
    #[arg(long)]
    variant: Option<LandmarkVariant>,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

impl Args {
    fn apply(&self, config: &mut PipelineConfig) {
        if self.boxes_only {
            config.mode = PipelineMode::BoxesOnly;
        }
        if let Some(confidence) = self.confidence {
            config.detector.confidence_threshold = confidence;
        }
        if let Some(iou) = self.iou {
            config.detector.iou_threshold = iou;
        }
        if let Some(max_detections) = self.max_detections {
            config.detector.max_detections = max_detections;
        }
        if let Some(pool_size) = self.pool_size {
            config.pool_size = pool_size;
        }
        if let Some(variant) = self.variant {
            config.landmark_variant = variant;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = PipelineConfig::from_env();
    args.apply(&mut config);

    let _telemetry = init_observability("pose", &config)?;

    tracing::info!(config = ?config, "Loaded configuration");

    let mut pipeline = PosePipeline::new(config)?;
    pipeline.initialize::<OrtBackend>()?;

    let frame = load_image(&args.image)?;
    tracing::info!(
        path = %args.image.display(),
        width = frame.width(),
        height = frame.height(),
        "Image loaded"
    );

    let result = pipeline.detect_frame(Arc::new(frame)).await;
    pipeline.dispose().await;
    let poses = result?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&poses)?
    } else {
        serde_json::to_string(&poses)?
    };
    println!("{}", json);

    Ok(())
}
