use card_scan::api::{HttpScanApi, ScanApi};
use card_scan::session::ScanSession;
use card_scan::{cli, config, error, report};
use card_scan_common::{render_overlay, JobId, ScaleTracker};
use cli::{Cli, Commands};
use clap::Parser;
use config::Config;
use dialoguer::Confirm;
use error::{Result, ScanError};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load()?;

    match cli.command {
        Commands::Submit { file, watch } => {
            println!("📤 card-scan - アップロード\n");
            let api: Arc<dyn ScanApi> = Arc::new(HttpScanApi::new(&config)?);
            let mut session = ScanSession::new(api, config.poll_interval());

            let job = session.submit(&file).await?;
            println!("✔ スキャンを受け付けました: #{} ({})", job.id, job.filename);

            if watch {
                watch_session(&mut session).await?;
            } else {
                session.teardown();
                println!("進捗の確認: card-scan watch {}", job.id);
            }
        }

        Commands::Watch { id } => {
            let api: Arc<dyn ScanApi> = Arc::new(HttpScanApi::new(&config)?);
            let mut session = ScanSession::new(api, config.poll_interval());
            session.track(id);
            watch_session(&mut session).await?;
        }

        Commands::Show { id, width } => {
            let api = HttpScanApi::new(&config)?;
            let job = api.fetch_record(id).await?;
            for line in report::job_summary(&job) {
                println!("{}", line);
            }

            if let Some(width) = width {
                let Some(card_path) = job.card_image_path.as_deref() else {
                    println!("\nカード画像がありません（{}）", job.status);
                    return Ok(());
                };
                let bytes = api.fetch_asset(card_path).await?;
                let image = image::load_from_memory(&bytes)
                    .map_err(|e| ScanError::ImageLoad(format!("{}: {}", card_path, e)))?;

                let mut tracker = ScaleTracker::new();
                tracker.track(card_path);
                let scale = tracker
                    .on_load(card_path, image.width() as f64, width)
                    .unwrap_or_else(|| tracker.current());

                println!(
                    "\n枠（元画像 {}px → 表示 {}px, 倍率 {:.3}）:",
                    image.width(),
                    width,
                    scale.get()
                );
                for overlay in render_overlay(&job.fields, scale) {
                    println!("{}", report::overlay_line(&job.fields, &overlay));
                }
            }
        }

        Commands::List => {
            let api = HttpScanApi::new(&config)?;
            let jobs = report::newest_first(api.list().await?, config.list_limit as usize);
            if jobs.is_empty() {
                println!("スキャン履歴はありません");
            } else {
                println!("スキャン履歴（{}件）:", jobs.len());
                for job in &jobs {
                    println!("{}", report::history_line(job));
                }
            }
        }

        Commands::Delete { id, yes } => {
            if !yes && !confirm_delete(id)? {
                println!("キャンセルしました");
                return Ok(());
            }
            let api = HttpScanApi::new(&config)?;
            api.delete(id).await?;
            println!("✔ スキャン #{} を削除しました", id);
        }

        Commands::Config { set_base_url, show } => {
            let mut config = config;

            if let Some(url) = set_base_url {
                config.set_base_url(url)?;
                println!("✔ ベースURLを設定しました");
            }

            if show {
                println!("設定:");
                println!("  ベースURL: {}", config.base_url);
                println!("  ポーリング周期: {}ms", config.poll_interval_ms);
                println!("  タイムアウト: {}秒", config.request_timeout_seconds);
                println!("  履歴の最大件数: {}", config.list_limit);
            }
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "card_scan=info" } else { "card_scan=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// 追跡中ジョブの進捗を終端まで表示する（Ctrl+Cで中断）
async fn watch_session(session: &mut ScanSession) -> Result<()> {
    let Some(poller) = session.poller() else {
        return Ok(());
    };
    println!("⏳ スキャン #{} を監視中...\n", poller.job_id());

    let bar = ProgressBar::new(100);
    if let Ok(style) = ProgressStyle::with_template("{bar:40.cyan/blue} {pos:>3}% {msg}") {
        bar.set_style(style);
    }

    let mut last = None;
    let mut interrupted = false;
    loop {
        tokio::select! {
            update = poller.next() => match update {
                Some(view) => {
                    bar.set_position(view.percent.round() as u64);
                    bar.set_message(view.display_label());
                    last = Some(view);
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                poller.stop();
                interrupted = true;
                break;
            }
        }
    }
    session.teardown();

    if interrupted {
        bar.abandon_with_message("中断しました");
        return Ok(());
    }
    bar.finish();

    match last.and_then(|view| view.record) {
        Some(job) if job.is_terminal() => {
            println!();
            for line in report::job_summary(&job) {
                println!("{}", line);
            }
        }
        _ => println!("\n終端状態を確認できませんでした"),
    }
    Ok(())
}

fn confirm_delete(id: JobId) -> Result<bool> {
    Confirm::new()
        .with_prompt(format!("スキャン #{} を削除しますか？", id))
        .default(false)
        .interact()
        .map_err(|e| ScanError::Io(std::io::Error::other(e)))
}
