use card_scan_common::JobId;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "card-scan")]
#[command(about = "カード画像の認識ジョブ投入・進捗監視ツール", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 詳細ログを出力
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// カード画像をアップロードしてスキャンを開始
    Submit {
        /// 画像ファイルのパス
        #[arg(required = true)]
        file: PathBuf,

        /// 投入後、完了まで進捗を表示
        #[arg(short, long)]
        watch: bool,
    },

    /// ジョブの進捗を完了まで表示
    Watch {
        /// ジョブID
        #[arg(required = true)]
        id: JobId,
    },

    /// ジョブの抽出結果を表示
    Show {
        /// ジョブID
        #[arg(required = true)]
        id: JobId,

        /// 表示幅（px）。指定するとカード画像の枠を表示倍率で出力
        #[arg(long)]
        width: Option<f64>,
    },

    /// スキャン履歴を表示（新しい順）
    List,

    /// スキャンを削除
    Delete {
        /// ジョブID
        #[arg(required = true)]
        id: JobId,

        /// 確認せずに削除
        #[arg(short, long)]
        yes: bool,
    },

    /// 設定を表示/編集
    Config {
        /// サーバーのベースURLを設定
        #[arg(long)]
        set_base_url: Option<String>,

        /// 設定を表示
        #[arg(long)]
        show: bool,
    },
}
