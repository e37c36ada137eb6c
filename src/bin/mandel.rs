extern crate clap;
extern crate env_logger;
extern crate failure;
extern crate fractalview;
extern crate image;
extern crate num_cpus;

use clap::{App, Arg, ArgMatches};
use failure::{err_msg, Error};
use fractalview::{ColorFunction, FractalRect, Mandelbrot, Renderer, ScreenSize, Viewport};
use image::png::PNGEncoder;
use image::ColorType;
use std::fs::File;
use std::str::FromStr;
use std::sync::Arc;

/// Given a string and a separator, returns the two values separated
/// by the separator.
fn parse_pair<T: FromStr>(s: &str, separator: char) -> Option<(T, T)> {
    match s.find(separator) {
        None => None,
        Some(index) => match (T::from_str(&s[..index]), T::from_str(&s[index + 1..])) {
            (Ok(l), Ok(r)) => Some((l, r)),
            _ => None,
        },
    }
}

/// Parses "x,y,width,height" into a view rectangle.
fn parse_rect(s: &str) -> Option<FractalRect> {
    let mut values = Vec::with_capacity(4);
    for part in s.split(',') {
        match f64::from_str(part.trim()) {
            Ok(value) => values.push(value),
            Err(_) => return None,
        }
    }
    if values.len() != 4 {
        return None;
    }
    Some(FractalRect {
        x: values[0],
        y: values[1],
        width: values[2],
        height: values[3],
    })
}

fn validate_pair<T: FromStr>(s: &str, separator: char, err: &str) -> Result<(), String> {
    match parse_pair::<T>(s, separator) {
        Some(_) => Ok(()),
        None => Err(err.to_string()),
    }
}

fn validate_range<T: FromStr + Ord>(
    s: &str,
    low: T,
    high: T,
    isnotanumber_err: &str,
    isnotinrange_err: &str,
) -> Result<(), String> {
    match T::from_str(s) {
        Ok(i) => {
            if i >= low && i <= high {
                Ok(())
            } else {
                Err(isnotinrange_err.to_string())
            }
        }
        Err(_) => Err(isnotanumber_err.to_string()),
    }
}

const OUTPUT: &str = "output";
const SIZE: &str = "size";
const VIEW: &str = "view";
const ITERATIONS: &str = "iterations";
const COLORING: &str = "coloring";
const THREADS: &str = "threads";

fn args<'a>() -> ArgMatches<'a> {
    let max_threads = num_cpus::get();

    App::new("mandel")
        .version("0.1.0")
        .about("Headless Mandelbrot snapshot renderer")
        .arg(
            Arg::with_name(OUTPUT)
                .required(false)
                .long(OUTPUT)
                .short("o")
                .takes_value(true)
                .help("Output file; derived from the view parameters when omitted"),
        )
        .arg(
            Arg::with_name(SIZE)
                .required(false)
                .long(SIZE)
                .short("s")
                .takes_value(true)
                .default_value("1280x800")
                .validator(|s| validate_pair::<usize>(&s, 'x', "Could not parse output image size"))
                .help("Size of output image"),
        )
        .arg(
            Arg::with_name(VIEW)
                .required(false)
                .long(VIEW)
                .short("v")
                .takes_value(true)
                .validator(|s| match parse_rect(&s) {
                    Some(_) => Ok(()),
                    None => Err("Could not parse view rectangle".to_string()),
                })
                .help("View rectangle as x,y,width,height; defaults to the whole set"),
        )
        .arg(
            Arg::with_name(ITERATIONS)
                .required(false)
                .long(ITERATIONS)
                .short("i")
                .takes_value(true)
                .default_value("500")
                .validator(move |s| {
                    validate_range(
                        &s,
                        0,
                        200_000,
                        "Could not parse iteration cap",
                        "Iteration cap must be between 0 and 200000",
                    )
                })
                .help("Maximum iterations per point"),
        )
        .arg(
            Arg::with_name(COLORING)
                .required(false)
                .long(COLORING)
                .short("c")
                .takes_value(true)
                .default_value("1.0")
                .validator(|s| match f64::from_str(&s) {
                    Ok(k) if k > 0.0 => Ok(()),
                    Ok(_) => Err("Coloring coefficient must be positive".to_string()),
                    Err(_) => Err("Could not parse coloring coefficient".to_string()),
                })
                .help("Coloring coefficient for the smooth gradient"),
        )
        .arg(
            Arg::with_name(THREADS)
                .required(false)
                .long(THREADS)
                .short("t")
                .takes_value(true)
                .validator(move |s| {
                    validate_range(
                        &s,
                        1,
                        max_threads,
                        "Could not parse thread count",
                        &format!("Thread count must be between 1 and {}", max_threads),
                    )
                })
                .help("Number of rendering threads; defaults to the CPU count"),
        )
        .get_matches()
}

/// Encodes the raster as a PNG file.
fn write_image(filename: &str, pixels: &[u8], size: ScreenSize) -> Result<(), Error> {
    let output = File::create(filename)?;
    PNGEncoder::new(output).encode(
        pixels,
        size.width as u32,
        size.height as u32,
        ColorType::RGB(8),
    )?;
    Ok(())
}

/// The view coordinates, the coloring coefficient, and the iteration
/// cap all go into the filename, so a saved snapshot can be recreated.
fn default_filename(viewport: &Viewport) -> String {
    let view = viewport.view();
    format!(
        "{} - {}, {} - {} ({}, {}).png",
        view.x,
        view.x + view.width,
        view.y,
        view.y + view.height,
        viewport.coloring(),
        viewport.max_iterations()
    )
}

fn run() -> Result<(), Error> {
    let matches = args();

    let (width, height) = parse_pair(matches.value_of(SIZE).unwrap(), 'x')
        .ok_or_else(|| err_msg("Error parsing image dimensions"))?;
    let view = match matches.value_of(VIEW) {
        Some(s) => parse_rect(s).ok_or_else(|| err_msg("Error parsing view rectangle"))?,
        None => Mandelbrot.default_view(),
    };
    let iterations = u32::from_str(matches.value_of(ITERATIONS).unwrap())?;
    let coloring = f64::from_str(matches.value_of(COLORING).unwrap())?;
    let threads = match matches.value_of(THREADS) {
        Some(s) => usize::from_str(s)?,
        None => num_cpus::get(),
    };

    let screen = ScreenSize { width, height };
    let viewport = Arc::new(
        Viewport::with_coloring(screen, view, iterations, coloring).map_err(err_msg)?,
    );
    let renderer =
        Renderer::with_workers(viewport.clone(), Arc::new(Mandelbrot), threads).map_err(err_msg)?;

    renderer.render_blocking();

    let filename = match matches.value_of(OUTPUT) {
        Some(name) => name.to_string(),
        None => default_filename(&viewport),
    };
    write_image(&filename, &renderer.frame_buffer().to_rgb8(), screen)
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("Render failure: {}", e);
        std::process::exit(1);
    }
}
