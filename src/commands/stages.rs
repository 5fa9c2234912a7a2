use crate::audio::TimelineAssembler;
use crate::clients::{DailyPapersClient, FeedSource, GeminiClient, GradioVoice, HostPublisher};
use crate::config::{Config, SourceKind};
use crate::error::{AppError, AppResult};
use crate::store::Store;
use crate::worker::acquire::run_acquire;
use crate::worker::publish::run_publish;
use crate::worker::synthesize::{SynthesizeOptions, Synthesizer};
use crate::worker::{RunReport, Selection};

use super::{AcquireArgs, PublishArgs, SynthesizeArgs};

pub async fn acquire(config: &Config, store: &Store, args: &AcquireArgs) -> AppResult<RunReport> {
    let selection = Selection::from_args(args.run.item_id.clone(), false);

    match config.source.kind {
        SourceKind::DailyPapers => {
            let source = DailyPapersClient::new(&config.source)?;
            run_acquire(store, &source, args.date, &selection).await
        }
        SourceKind::Feed => {
            let source = FeedSource::new(&config.source.url)?;
            run_acquire(store, &source, args.date, &selection).await
        }
    }
}

pub async fn synthesize(config: &Config, store: &Store, args: &SynthesizeArgs) -> AppResult<RunReport> {
    let selection = Selection::from_args(args.run.item_id.clone(), args.remove_script);

    let api_key = require_secret(config, &config.narration.api_key_env)?;
    let writer = GeminiClient::new(&config.narration, api_key)?;
    let voice = GradioVoice::new(&config.voice)?;
    let renderer = TimelineAssembler::new(&config.mix);
    let options = SynthesizeOptions {
        keep_audio: args.keep_audio || config.keep_audio,
    };

    Synthesizer::new(store, &writer, &voice, &renderer, options)
        .run(&selection)
        .await
}

pub async fn publish(config: &Config, store: &Store, args: &PublishArgs) -> AppResult<RunReport> {
    let selection = Selection::from_args(args.run.item_id.clone(), false);

    let token = require_secret(config, &config.publish.token_env)?;
    let publisher = HostPublisher::new(&config.publish, token)?;

    run_publish(store, &publisher, &selection).await
}

fn require_secret(config: &Config, var: &str) -> AppResult<String> {
    config
        .secret(var)
        .ok_or_else(|| AppError::Config(format!("{} is not set (environment or .env)", var)))
}
