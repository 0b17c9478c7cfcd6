//! Subscriber de `tracing` del binario.
//!
//! Lee `RUST_LOG` (default `info`) y escribe a stderr, dejando stdout para
//! la salida JSON de los comandos. Los registros `log` de las librerías
//! llegan por el puente `tracing-log` que instala `try_init`.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter)
                                     .with_writer(std::io::stderr)
                                     .try_init();
}
