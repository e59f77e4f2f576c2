use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::error;

use pagecrypt::error_kind;

mod cli;
mod util;
mod cmd_layout;
mod cmd_blocksize;
mod cmd_file;
mod cmd_keygen;

fn init_logger() {
    // Уровень берём из RUST_LOG, иначе дефолт - info.
    // Пример: RUST_LOG=debug ./pagecrypt ...
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        match error_kind(&e) {
            Some(k) if k.is_fatal() => error!("fatal: {:#}", e),
            _ => error!("{:#}", e),
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::LayoutCreate { data_dir, name, reserved, max_features, feature } =>
            cmd_layout::exec_create(data_dir, name, reserved, max_features, feature),

        cli::Cmd::LayoutShow { data_dir, name, json } =>
            cmd_layout::exec_show(data_dir, name, json),

        cli::Cmd::Blocksize { block_size, reserved, json } =>
            cmd_blocksize::exec(block_size, reserved, json),

        cli::Cmd::EncryptFile { input, out, page, non_permanent } =>
            cmd_file::exec_encrypt(input, out, page, non_permanent),

        cli::Cmd::DecryptFile { input, out, page, non_permanent } =>
            cmd_file::exec_decrypt(input, out, page, non_permanent),

        cli::Cmd::Keygen { method, base64 } =>
            cmd_keygen::exec(method, base64),
    }
}
