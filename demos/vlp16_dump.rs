use vlp16_parser::{PointSource, TurnIterator};
use vlp16_parser::packet::{PcapSource, RawFrameSource};
use std::io;
use structopt::StructOpt;

#[derive(StructOpt)]
#[structopt(
    name = "vlp16 dump",
    about = "Decode VLP-16 data packets from a pcap file")]
struct Cli {
    /// Path to pcap file
    path: String,
    /// Print only per-turn point counts, turns are split at this azimuth
    /// (degrees*100)
    #[structopt(long = "turns", short = "t")]
    turns: Option<u16>,
    /// Print absolute UTC time instead of microseconds from the hour
    #[structopt(long = "utc", short = "u")]
    utc: bool,
}

fn dump<T: RawFrameSource>(source: T, utc: bool) -> io::Result<()> {
    let mut point_source = PointSource::new(source);
    let mut cloud = Vec::new();
    loop {
        let mut points = Vec::with_capacity(384);
        let packet = match point_source.process_points(|p| points.push(p))? {
            Some(packet) => packet,
            None => break,
        };
        let captured = packet.captured;
        cloud.extend(points.into_iter().map(|p| (p, captured)));
    }

    let stats = point_source.stats();
    println!("// Position Packets = {}", stats.position);
    println!("// Data Packets = {}", stats.data);
    println!("// Other = {}", stats.other);

    println!("// Packet contains: ");
    println!("{{");
    for (point, captured) in cloud {
        match captured {
            Some(captured) if utc => println!("// {}", point.datetime(captured)),
            _ => (),
        }
        println!("{},", point);
    }
    println!("}}");
    Ok(())
}

fn turns<T: RawFrameSource>(source: T, split: u16) -> io::Result<()> {
    let mut iter = TurnIterator::new(source);
    iter.set_split_azimuth(split);
    for (i, turn) in iter.by_ref().enumerate() {
        println!("turn {}: {} points", i, turn?.len());
    }
    println!("{:?}", iter.stats());
    Ok(())
}

fn main() -> io::Result<()> {
    let args = Cli::from_args();
    let source = PcapSource::new(&args.path, false)
        .expect("Failed to initialize pcap source");
    match args.turns {
        Some(split) => turns(source, split),
        None => dump(source, args.utc),
    }
}
