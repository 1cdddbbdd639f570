//! `rayup discover` and `rayup show-env` — persisted topology.

use std::path::Path;

use anyhow::{Result, bail};
use rayup_core::EnvFile;
use rayup_core::envfile::{KEY_CLUSTER_NODES, KEY_ETH_IF, KEY_IB_IF, KEY_LOCAL_IP};
use rayup_exec::{Discovery, ShellExecutor};

use super::Context;

pub async fn discover(ctx: &Context, command: &Path) -> Result<()> {
    let exec = ShellExecutor::new();
    let found = Discovery::new(command).discover(&exec).await?;

    if found.nodes.is_empty() {
        bail!("discovery found no nodes; pass -n node1,node2 explicitly");
    }

    println!("Discovered configuration:");
    println!("  {KEY_CLUSTER_NODES}={}", found.nodes.join(","));
    if let Some(ip) = &found.local_ip {
        println!("  {KEY_LOCAL_IP}={ip}");
    }
    if let Some(eth) = &found.eth_if {
        println!("  {KEY_ETH_IF}={eth}");
    }
    if let Some(ib) = &found.ib_if {
        println!("  {KEY_IB_IF}={ib}");
    }
    println!();

    let mut env = EnvFile::load(&ctx.env_file)?;
    env.set(KEY_CLUSTER_NODES, found.nodes.join(","));
    if let Some(ip) = found.local_ip {
        env.set(KEY_LOCAL_IP, ip);
    }
    if let Some(eth) = found.eth_if {
        env.set(KEY_ETH_IF, eth);
    }
    if let Some(ib) = found.ib_if {
        env.set(KEY_IB_IF, ib);
    }
    env.save()?;

    println!("Saved to {}", ctx.env_file.display());
    Ok(())
}

pub fn show_env(ctx: &Context) -> Result<()> {
    let env = EnvFile::load(&ctx.env_file)?;
    if env.is_empty() {
        println!("No configuration at {}", ctx.env_file.display());
        println!("Run `rayup discover` to detect cluster nodes.");
        return Ok(());
    }

    println!("Configuration ({}):", ctx.env_file.display());
    for (key, value) in env.values() {
        println!("  {key}={value}");
    }
    Ok(())
}
