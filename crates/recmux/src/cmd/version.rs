use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("recmux {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: recmux");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "target: {}",
        option_env!("RECMUX_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("wire_byte_order: {:?}", recmux_frame::WIRE_BYTE_ORDER);
    println!("header_size: {}", recmux_frame::HEADER_SIZE);
    println!("max_select_fd: {}", recmux_transport::MAX_SELECT_FD);
    println!(
        "features: process={}, cli=true",
        cfg!(feature = "process")
    );

    Ok(SUCCESS)
}
