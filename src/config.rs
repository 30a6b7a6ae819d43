//! Process configuration (SPEC_FULL.md, Configuration [AMBIENT]).
//!
//! `fmspy` reads these same knobs from an ini-style `fmspy.cfg` under the
//! `[RTMP]` section (`handshakeTimeout`, `pingInterval`, `keepAliveTimeout`);
//! the teacher's `main.rs` takes its listen ports as `#[derive(Clap)]` flags
//! instead, so that's the surface this server exposes them through.

use clap::Clap;

#[derive(Clap, Debug, Clone)]
#[clap(version = clap::crate_version!(), author = "Ninthakeey <ninthakeey@hotmail.com>")]
pub struct Opts {
    /// Address to bind the RTMP listener on.
    #[clap(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// TCP port to accept RTMP connections on.
    #[clap(long, default_value = "1935")]
    pub rtmp_port: u16,

    /// Listen socket backlog.
    #[clap(long, default_value = "128")]
    pub backlog: u32,

    /// Seconds allowed to complete the C0/C1/C2 handshake before the
    /// connection is dropped.
    #[clap(long, default_value = "10")]
    pub handshake_timeout_secs: u64,

    /// Seconds between server-initiated keep-alive pings.
    #[clap(long, default_value = "30")]
    pub ping_interval_secs: u64,

    /// Seconds of silence from a peer (no data, no ping reply) before the
    /// connection is considered dead.
    #[clap(long, default_value = "90")]
    pub keep_alive_timeout_secs: u64,

    /// Chunk size advertised to peers at connect time.
    #[clap(long, default_value = "128")]
    pub default_chunk_size: u32,

    /// Names of bundled demo applications to mount in the registry
    /// (spec.md §6 "application-enable flags by application name"). Known
    /// names are `echo` and `chat`; an unknown name is mounted as a no-op
    /// by `server::build_registry` and logged.
    #[clap(long, default_value = "echo,chat", use_delimiter = true)]
    pub enabled_apps: Vec<String>,
}

impl Opts {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.rtmp_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_addr_combines_bind_and_port() {
        let opts = Opts {
            bind: "127.0.0.1".to_string(),
            rtmp_port: 1935,
            backlog: 128,
            handshake_timeout_secs: 10,
            ping_interval_secs: 30,
            keep_alive_timeout_secs: 90,
            default_chunk_size: 128,
            enabled_apps: vec!["echo".to_string()],
        };
        assert_eq!(opts.listen_addr(), "127.0.0.1:1935");
    }
}
