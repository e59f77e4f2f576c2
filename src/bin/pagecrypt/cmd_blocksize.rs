use anyhow::Result;

use pagecrypt::BlockSizeConfig;

/// CLI: blocksize - вывести производные константы блока.
pub fn exec(block_size: u32, reserved: String, json: bool) -> Result<()> {
    let cfg = BlockSizeConfig::init_from_str(block_size, &reserved)?;

    if json {
        let obj = serde_json::json!({
            "block_size": cfg.block_size(),
            "block_setting": cfg.block_setting(),
            "block_bits": cfg.block_bits(),
            "reserved": cfg.reserved().to_string(),
            "reserved_bytes": cfg.reserved_bytes(),
            "footer_start": cfg.footer_start(),
            "max_payload_bytes": cfg.max_payload_bytes(),
            "fsm": cfg.fsm(),
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    println!("block_size        = {}", cfg.block_size());
    println!("block_setting     = {}", cfg.block_setting());
    println!("block_bits        = {}", cfg.block_bits());
    println!("reserved          = {} ({} bytes)", cfg.reserved(), cfg.reserved_bytes());
    println!("footer_start      = {}", cfg.footer_start());
    println!("max_payload_bytes = {}", cfg.max_payload_bytes());
    let fsm = cfg.fsm();
    println!(
        "fsm               = nodes:{} non_leaf:{} slots:{} cat_step:{}",
        fsm.nodes_per_page, fsm.non_leaf_nodes_per_page, fsm.slots_per_page, fsm.cat_step
    );
    Ok(())
}
