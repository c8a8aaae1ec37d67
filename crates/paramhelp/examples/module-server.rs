//! A module that owns its parameters and serves them over a socket.
//!
//! Run with:
//!   cargo run --example module-server --features peer
//!
//! In another terminal:
//!   cargo run --features cli -- set -s /tmp/paramhelp-module.sock gain 2.5
//!   cargo run --features cli -- rpc -s /tmp/paramhelp-module.sock scale 3
//!   cargo run --features cli -- watch -s /tmp/paramhelp-module.sock --count 5

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use paramhelp::peer::{ParamListener, ServerHub};
use paramhelp::{
    Bounds, CommandDescriptor, IoType, ParamCell, ParamDescriptor, ParamRegistry, ParamServer,
    ParamType, SizePolicy,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let gain = ParamCell::new(vec![1.0]);
    let offsets = ParamCell::<i64>::new(Vec::new());

    let mut registry = ParamRegistry::new();
    registry.add_params([
        ParamDescriptor::new(0, "gain", ParamType::Double)
            .with_bounds(Bounds::Double { min: 0.0, max: 5.0 })
            .with_io(IoType::default() | IoType::STREAMING)
            .with_description("Output multiplier"),
        ParamDescriptor::new(1, "offsets", ParamType::Int)
            .with_size(SizePolicy::Variable { min: 0, max: 4 })
            .with_description("Per-joint offsets"),
    ])?;
    registry.add_command(
        CommandDescriptor::new(0, "scale", 1).with_description("Multiply gain by a factor"),
    )?;
    registry.link_param(0, gain.clone())?;
    registry.link_param(1, offsets.clone())?;

    registry.register_param_callback(0, |desc, value| {
        eprintln!("{} is now {value}", desc.name);
    })?;
    {
        let gain = gain.clone();
        registry.register_command_callback(0, move |_, args, reply| {
            match args[0].parse::<f64>() {
                // Writes the cell directly, bypassing bounds, as module code may.
                Ok(factor) => {
                    let scaled = gain.update(|values| {
                        values[0] *= factor;
                        values[0]
                    });
                    reply.push(format!("gain scaled to {scaled}"));
                }
                Err(_) => reply.push(format!("not a factor: {}", args[0])),
            }
        })?;
    }

    let server = Arc::new(ParamServer::with_registry("module", registry));
    let hub = ServerHub::new(Arc::clone(&server));

    let sock_path = std::env::temp_dir().join("paramhelp-module.sock");
    let listener = ParamListener::bind(&sock_path)?;
    eprintln!("Listening on {}", sock_path.display());

    {
        let server = Arc::clone(&server);
        thread::spawn(move || loop {
            let _ = server.read_stream_params(false);
            if server.send_stream_params().is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(500));
        });
    }

    loop {
        let stream = listener.accept_stream()?;
        hub.serve(stream)?;
        eprintln!("offsets: {:?}", offsets.value());
    }
}
