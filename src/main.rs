//! `framecast` binary: send, receive and serve media frames over UDP.
//!
//! Installs a `tracing` subscriber (filtered by `RUST_LOG`), optionally a
//! Prometheus exporter, and cancels long-running commands on Ctrl-C.

mod cli;

use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use clap::Parser;
use cli::{Cli, Command, PayloadKind, ProtocolArgs, ReassemblyArgs, SourceArgs};
use framecast::{
    Endianness,
    FrameIdGenerator,
    FrameProducer,
    FrameReceiver,
    FrameSender,
    MediaKind,
    MediaSample,
    ProtocolConfig,
    ReassemblyLimits,
    SharedFrameReceiver,
    SubscriptionRegistry,
    control::{ControlClient, ControlCommand, serve_control},
    media::Codec,
    protocol::ConfigError,
    transport::{DEFAULT_SWEEP_INTERVAL, run_receiver},
};
use tokio::{
    net::{TcpListener, UdpSocket},
    sync::mpsc,
    time,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framecast=info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = protocol_config(&cli.protocol)?;
    install_metrics(cli.metrics_addr)?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let token = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("shutting down");
                    token.cancel();
                }
                Err(err) => warn!(%err, "cannot listen for Ctrl-C"),
            }
        }
    });

    match cli.command {
        Command::Send { to, bind, source } => send(config, to, bind, &source).await,
        Command::Receive {
            bind,
            reassembly,
            output_dir,
            control,
            flow,
            advertise,
        } => {
            let subscription = control.zip(flow);
            let options = ReceiveOptions {
                bind,
                limits: reassembly_limits(&reassembly),
                output_dir,
                subscription,
                advertise,
            };
            receive(config, options, shutdown).await
        }
        Command::Serve {
            control,
            bind,
            interval_ms,
            source,
        } => {
            let interval = Duration::from_millis(interval_ms.max(1));
            serve(config, control, bind, interval, &source, shutdown).await
        }
    }
}

fn protocol_config(args: &ProtocolArgs) -> Result<ProtocolConfig, ConfigError> {
    let mut config = if args.extended {
        ProtocolConfig::extended()
    } else {
        ProtocolConfig::reference()
    };
    if args.little_endian {
        config = config.with_endianness(Endianness::Little);
    }
    match args.max_frame_size {
        Some(max) => config.with_max_frame_size(max),
        None => Ok(config),
    }
}

fn reassembly_limits(args: &ReassemblyArgs) -> ReassemblyLimits {
    let timeout = (args.reassembly_timeout_ms > 0)
        .then(|| Duration::from_millis(args.reassembly_timeout_ms));
    ReassemblyLimits::default()
        .with_timeout(timeout)
        .with_max_in_flight(NonZeroUsize::new(args.max_in_flight))
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: Option<SocketAddr>) -> Result<(), BoxError> {
    if let Some(addr) = addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        info!(%addr, "serving metrics");
    }
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: Option<SocketAddr>) -> Result<(), BoxError> {
    if addr.is_some() {
        warn!("built without the metrics feature; ignoring --metrics-addr");
    }
    Ok(())
}

/// Media kind for `path`, guessing the codec from its extension.
fn media_kind(kind: PayloadKind, path: &Path) -> MediaKind {
    let codec = || {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or_else(|| Codec::Other(String::new()), Codec::from_encoding_name)
    };
    match kind {
        PayloadKind::Unspecified => MediaKind::Unknown,
        PayloadKind::Audio => MediaKind::Audio {
            codec: codec(),
            config: None,
        },
        PayloadKind::Video => MediaKind::Video {
            codec: codec(),
            config: None,
        },
    }
}

async fn load_samples(source: &SourceArgs) -> Result<Vec<(MediaKind, Bytes)>, BoxError> {
    let mut samples = Vec::with_capacity(source.files.len());
    for path in &source.files {
        let payload = tokio::fs::read(path).await?;
        samples.push((media_kind(source.kind, path), Bytes::from(payload)));
    }
    Ok(samples)
}

fn frame_producer(source: &SourceArgs) -> Result<FrameProducer, BoxError> {
    let ids = Arc::new(FrameIdGenerator::steady());
    Ok(FrameProducer::new(source.task.clone(), source.flow.clone(), ids)?)
}

async fn send(
    config: ProtocolConfig,
    to: SocketAddr,
    bind: SocketAddr,
    source: &SourceArgs,
) -> Result<(), BoxError> {
    let sender = FrameSender::new(
        config,
        UdpSocket::bind(bind).await?,
        Arc::new(SubscriptionRegistry::new()),
    );
    let producer = frame_producer(source)?;
    let started = Instant::now();
    for (kind, payload) in load_samples(source).await? {
        let frame = producer.produce(MediaSample {
            kind,
            elapsed: started.elapsed(),
            payload,
        });
        let datagrams = sender.send_to(&frame, to).await?;
        info!(frame = %frame.id, number = frame.number, datagrams, %to, "sent frame");
    }
    Ok(())
}

struct ReceiveOptions {
    bind: SocketAddr,
    limits: ReassemblyLimits,
    output_dir: Option<PathBuf>,
    subscription: Option<(SocketAddr, String)>,
    advertise: Option<SocketAddr>,
}

async fn receive(
    config: ProtocolConfig,
    options: ReceiveOptions,
    shutdown: CancellationToken,
) -> Result<(), BoxError> {
    let socket = UdpSocket::bind(options.bind).await?;
    let local = socket.local_addr()?;
    info!(%local, "receiving frames");

    let mut control = None;
    if let Some((server, flow)) = options.subscription {
        let mut client = ControlClient::connect(server).await?;
        let command = ControlCommand::Subscribe {
            flow: flow.clone(),
            address: options.advertise.unwrap_or(local),
        };
        let reply = client.request(&command).await?;
        info!(%reply, "subscribed");
        control = Some((client, flow));
    }
    if let Some(dir) = &options.output_dir {
        tokio::fs::create_dir_all(dir).await?;
    }

    let receiver = SharedFrameReceiver::new(FrameReceiver::new(config, options.limits));
    let (tx, mut rx) = mpsc::channel(64);
    let task = tokio::spawn(run_receiver(
        socket,
        receiver.clone(),
        tx,
        shutdown,
        DEFAULT_SWEEP_INTERVAL,
    ));

    while let Some(frame) = rx.recv().await {
        info!(
            frame = %frame.id,
            number = frame.number,
            flow = %frame.flow,
            bytes = frame.data.len(),
            "received frame"
        );
        if let Some(dir) = &options.output_dir {
            let path = dir.join(format!("{}-{:05}-{}.bin", frame.flow, frame.number, frame.id));
            tokio::fs::write(&path, &frame.data).await?;
        }
    }
    task.await??;
    info!(stats = ?receiver.gate_stats(), "receiver stopped");

    if let Some((mut client, flow)) = control {
        if let Err(err) = client.request(&ControlCommand::Unsubscribe { flow }).await {
            warn!(%err, "unsubscribe failed");
        }
    }
    Ok(())
}

#[expect(
    clippy::integer_division_remainder_used,
    reason = "tokio::select! expands to modulus internally"
)]
async fn serve(
    config: ProtocolConfig,
    control: SocketAddr,
    bind: SocketAddr,
    interval: Duration,
    source: &SourceArgs,
    shutdown: CancellationToken,
) -> Result<(), BoxError> {
    let registry = Arc::new(SubscriptionRegistry::new());
    let listener = TcpListener::bind(control).await?;
    info!(control = %listener.local_addr()?, flow = %source.flow, "serving");
    let control_task = tokio::spawn(serve_control(
        listener,
        Arc::clone(&registry),
        shutdown.clone(),
    ));

    let samples = load_samples(source).await?;
    let sender = FrameSender::new(config, UdpSocket::bind(bind).await?, registry);
    let producer = frame_producer(source)?;
    let mut ticker = time::interval(interval);
    let started = Instant::now();

    for (kind, payload) in samples.iter().cycle() {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => break,

            _ = ticker.tick() => {}
        }
        let frame = producer.produce(MediaSample {
            kind: kind.clone(),
            elapsed: started.elapsed(),
            payload: payload.clone(),
        });
        match sender.publish(&frame).await {
            Ok(Some(datagrams)) => debug!(frame = %frame.id, datagrams, "published frame"),
            Ok(None) => {}
            Err(err) => warn!(frame = %frame.id, %err, "publishing frame failed"),
        }
    }

    control_task.await??;
    Ok(())
}
