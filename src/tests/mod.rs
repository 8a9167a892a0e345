mod classification;
mod containers;
mod dex_files;
