//! Probes the physical memory facilities of the running system.
//!
//! ```text
//! physmem-probe hugepage [POWER]       allocate, fill, translate and release one huge page
//! physmem-probe const [ID]             print one platform constant, or all of them
//! physmem-probe numa                   print the memory policy and current CPU/node
//! physmem-probe translate-self         translate an address on this thread's stack
//! physmem-probe peek ADDR [WORDS]      read 32-bit words of physical memory via /dev/mem
//! physmem-probe pci BB:DD.F            print the NUMA node (and IDs, on x86) of a PCI function
//! ```
//!
//! Set `PHYSMEM_LOG` to `error`, `warn`, `info`, `debug` or `trace` to change
//! the log level.

mod logger;

use logger::StderrLogger;
use physmem::pci::PciAddress;
use physmem::{
    AddressTranslator, HugepageAllocator, HugepageSize, PageSize, PhysicalAddress,
    PhysicalMemoryMapper, SystemConstant, TranslateError, VirtualAddress, constants, numa,
};
use std::env;
use std::error::Error as _;
use std::process::ExitCode;

const USAGE: &str = "usage: physmem-probe <hugepage [POWER] | const [ID] | numa | translate-self | peek ADDR [WORDS] | pci BB:DD.F>";

enum Command {
    Hugepage { power: u32 },
    Constant { id: Option<i32> },
    Numa,
    TranslateSelf,
    Peek {
        address: u64,
        words: usize,
        length: usize,
    },
    Pci { address: PciAddress },
}

fn main() -> ExitCode {
    if let Err(e) = StderrLogger::from_env().init() {
        eprintln!("failed to install logger: {e}");
    }

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = parse(&args) else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    match run(&command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            let mut source = e.source();
            while let Some(cause) = source {
                log::error!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}

fn parse(args: &[String]) -> Option<Command> {
    let (name, rest) = args.split_first()?;
    let command = match (name.as_str(), rest) {
        ("hugepage", []) => Command::Hugepage {
            power: physmem::Size2M::SHIFT,
        },
        ("hugepage", [power]) => Command::Hugepage {
            power: power.parse().ok()?,
        },
        ("const", []) => Command::Constant { id: None },
        ("const", [id]) => Command::Constant {
            id: Some(id.parse().ok()?),
        },
        ("numa", []) => Command::Numa,
        ("translate-self", []) => Command::TranslateSelf,
        ("peek", [address]) => peek_command(parse_u64(address)?, 4)?,
        ("peek", [address, words]) => peek_command(parse_u64(address)?, words.parse().ok()?)?,
        ("pci", [bdf]) => Command::Pci {
            address: parse_bdf(bdf)?,
        },
        _ => return None,
    };
    Some(command)
}

/// `None` if the window of `words` 32-bit words at `address` overflows.
fn peek_command(address: u64, words: usize) -> Option<Command> {
    let skip = usize::try_from(address % constants::page_size()).ok()?;
    let length = words.checked_mul(4)?.checked_add(skip)?;
    address.checked_add(u64::try_from(length).ok()?)?;
    Some(Command::Peek {
        address,
        words,
        length,
    })
}

fn parse_u64(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16).ok(),
        None => text.replace('_', "").parse().ok(),
    }
}

/// Parses `bb:dd.f` (hex), optionally prefixed with segment `0000:`.
fn parse_bdf(text: &str) -> Option<PciAddress> {
    let text = text.strip_prefix("0000:").unwrap_or(text);
    let (bus, rest) = text.split_once(':')?;
    let (device, function) = rest.split_once('.')?;
    PciAddress::new(
        u8::from_str_radix(bus, 16).ok()?,
        u8::from_str_radix(device, 16).ok()?,
        u8::from_str_radix(function, 16).ok()?,
    )
}

fn run(command: &Command) -> Result<(), physmem::Error> {
    match *command {
        Command::Hugepage { power } => hugepage(power),
        Command::Constant { id } => constant(id),
        Command::Numa => numa_info(),
        Command::TranslateSelf => translate_self(),
        Command::Peek {
            address,
            words,
            length,
        } => peek(address, words, length),
        Command::Pci { address } => pci(address),
    }
}

fn hugepage(power: u32) -> Result<(), physmem::Error> {
    let geometry = HugepageSize::from_power(power)?;
    let mut region = physmem::allocate(geometry.bytes(), geometry.bytes(), geometry.power())?;
    let base = region.base();

    for (i, byte) in region.as_mut_slice().iter_mut().take(4096).enumerate() {
        *byte = i.to_le_bytes()[0];
    }

    let translator = AddressTranslator::new();
    let info = translator.translate(base)?;
    println!("{geometry} huge page at {base}");
    println!("  pagemap record  {:#018X}", info.page_table_entry_raw());
    match translator.virt_to_phys(base) {
        Ok(pa) => println!("  physical        {pa}"),
        Err(e) => println!("  physical        unavailable ({e})"),
    }

    HugepageAllocator::release(region)?;
    match translator.translate(base) {
        Err(TranslateError::NotPresent { .. }) => {
            println!("  released, stale address no longer translates");
        }
        Ok(_) => log::warn!("{base} still translates after release"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn constant(id: Option<i32>) -> Result<(), physmem::Error> {
    if let Some(id) = id {
        println!("{}", constants::lookup(id)?);
        return Ok(());
    }

    for constant in SystemConstant::ALL {
        println!(
            "{:>2} {:<14} {:#X}",
            constant.id(),
            constant.name(),
            constants::lookup(constant.id())?
        );
    }
    Ok(())
}

fn numa_info() -> Result<(), physmem::Error> {
    let location = numa::current_cpu()?;
    println!("cpu {} on node {}", location.cpu, location.node);

    match numa::memory_policy() {
        Ok(policy) => {
            match &policy.nodes {
                Some(nodes) => println!("policy {:?} over nodes {nodes:?}", policy.mode),
                None => println!("policy {:?}", policy.mode),
            }
            if policy.flags != numa::PolicyFlags::default() {
                println!("  flags {:?}", policy.flags);
            }
        }
        Err(e) => log::warn!("memory policy unavailable: {e}"),
    }
    Ok(())
}

fn translate_self() -> Result<(), physmem::Error> {
    let marker = [0x5A_u8; 64];
    let address = VirtualAddress::from_ptr(marker.as_ptr());

    let info = AddressTranslator::new().read_entry(address)?;
    std::hint::black_box(&marker);
    let entry = info.entry();
    println!("{address}: record {:#018X}", info.page_table_entry_raw());
    println!(
        "  present {} swapped {} soft-dirty {} exclusive {} file/shared {}",
        entry.present(),
        entry.swapped(),
        entry.soft_dirty(),
        entry.exclusive(),
        entry.file_or_shared_anon()
    );
    match info.physical_frame_number() {
        Some(frame) if frame.is_zero() => println!("  frame hidden (CAP_SYS_ADMIN required)"),
        Some(frame) => println!("  frame {frame}"),
        None => println!("  no frame"),
    }
    Ok(())
}

fn peek(address: u64, words: usize, length: usize) -> Result<(), physmem::Error> {
    let page_size = constants::page_size();
    let physical = PhysicalAddress::new(address);
    let base = PhysicalAddress::new(address & !(page_size - 1));
    let skip = length - words * 4;

    let region = PhysicalMemoryMapper::new().map(base, length)?;
    let mut values = Vec::with_capacity(words);
    let mut result: Result<(), physmem::Error> = Ok(());
    for i in 0..words {
        match region.read::<u32>(skip + i * 4) {
            Ok(value) => values.push(value),
            Err(e) => {
                result = Err(e.into());
                break;
            }
        }
    }
    PhysicalMemoryMapper::unmap(region)?;
    result?;

    for (i, value) in values.iter().enumerate() {
        println!("{}: {value:#010X}", physical + (i as u64) * 4);
    }
    Ok(())
}

fn pci(address: PciAddress) -> Result<(), physmem::Error> {
    match address.numa_node()? {
        Some(node) => println!("{address}: node {node}"),
        None => println!("{address}: no NUMA affinity"),
    }

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        PciAddress::request_config_access()?;
        // SAFETY: port grants were just obtained; this tool is the only user
        // of the configuration ports while it runs.
        let ids = unsafe { address.read_config(0) };
        println!("{address}: vendor {:04x} device {:04x}", ids & 0xFFFF, ids >> 16);
    }
    Ok(())
}
