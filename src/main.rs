use std::{env, error, process};

use model::bus::{
    CTRL_START_FRAME, REG_CTRL, REG_DMA_CMD, REG_DMA_DST, REG_DMA_LEN, REG_DMA_SRC, REG_HDMI_CRC,
    REG_ID, REG_INT_MASK, REG_INT_STATUS, REG_IRQ_TEST, REG_REV,
};
use model::hydra::Hydra;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Cycle budgets for the bounded waits. A wait that runs out is a device
/// bug, not a longer wait.
const FRAME_WAIT_CYCLES: u32 = 5000;
const DMA_WAIT_CYCLES: u32 = 2000;
const MSI_WAIT_CYCLES: u32 = 1000;

fn main() {
    println!("hydra v0.1.0");

    let args = env::args().skip(1).collect::<Vec<String>>();
    let _guard = init_tracing(args.iter().any(|a| a == "--log-file"));

    let mut device = Hydra::new();
    info!(
        "device id {:#010x} rev {:#06x}",
        device.bus.read_word(REG_ID),
        device.bus.read_word(REG_REV)
    );

    if let Err(e) = run_smoke(&mut device) {
        eprintln!("smoke run failed: {e}");
        dump_trace(&device);
        process::exit(1);
    }

    dump_trace(&device);
    println!("smoke run passed");
}

/// The original bring-up sequence: unmask, kick a frame, check the CRC
/// latch, force an MSI strobe with the mask cleared, then a DMA round
/// trip.
fn run_smoke(device: &mut Hydra) -> Result<(), Box<dyn error::Error>> {
    device.bus.write_word(REG_INT_MASK, 0x1F);
    device.bus.write_word(REG_CTRL, 1 << CTRL_START_FRAME);

    if !wait_status_bit(device, 0, FRAME_WAIT_CYCLES) {
        return Err("frame done interrupt never arrived".into());
    }
    let first_crc = device.bus.read_word(REG_HDMI_CRC);
    info!("frame complete, crc {first_crc:#010x}, irq_out={}", device.irq_out());
    if first_crc == 0 {
        return Err("crc latch still zero after a completed frame".into());
    }

    // The forced strobe must come through even with everything masked.
    device.bus.write_word(REG_INT_MASK, 0);
    device.bus.write_word(REG_IRQ_TEST, 1);
    let mut msi_seen = false;
    for _ in 0..MSI_WAIT_CYCLES {
        device.step();
        if device.msi_pulse() {
            msi_seen = true;
            break;
        }
    }
    if !msi_seen {
        return Err("msi strobe never arrived after IRQ_TEST".into());
    }
    info!("msi strobe observed with mask clear");
    device.bus.write_word(REG_INT_MASK, 0x1F);

    // Second frame: the checksum keeps accumulating.
    device.bus.write_word(REG_INT_STATUS, 0xFFFF_FFFF);
    device.bus.write_word(REG_CTRL, 1 << CTRL_START_FRAME);
    if !wait_status_bit(device, 0, FRAME_WAIT_CYCLES) {
        return Err("second frame done interrupt never arrived".into());
    }
    let second_crc = device.bus.read_word(REG_HDMI_CRC);
    info!("second frame complete, crc {second_crc:#010x}");
    if second_crc == first_crc {
        return Err("crc latch did not accumulate across frames".into());
    }

    // DMA round trip.
    device.bus.write_word(REG_INT_STATUS, 0xFFFF_FFFF);
    device.bus.write_word(REG_DMA_SRC, 0x0000_0000);
    device.bus.write_word(REG_DMA_DST, 0x0000_0040);
    device.bus.write_word(REG_DMA_LEN, 0x0000_0040);
    device.bus.write_word(REG_DMA_CMD, 0x1);

    if !wait_status_bit(device, 1, DMA_WAIT_CYCLES) {
        return Err("dma done interrupt never arrived".into());
    }
    device.bus.write_word(REG_INT_STATUS, 1 << 1);
    info!("dma round trip complete, irq_out={}", device.irq_out());

    Ok(())
}

fn wait_status_bit(device: &mut Hydra, bit: u8, budget: u32) -> bool {
    for _ in 0..budget {
        if device.bus.read_word(REG_INT_STATUS) & (1 << bit) != 0 {
            return true;
        }
        device.step();
    }
    false
}

fn dump_trace(device: &Hydra) {
    info!("recent bus traffic:");
    for record in device.bus.trace() {
        info!("  {record}");
    }
}

fn init_tracing(log_to_file: bool) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if log_to_file {
        let appender = tracing_appender::rolling::never(env::temp_dir(), "hydra-smoke.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        None
    }
}
