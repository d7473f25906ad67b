//! File formats of the pipeline: simulation bundles, sample tables, dataset
//! tables, and the staged writes that keep every output either fully old or
//! fully new.

pub mod bundle;
pub mod staged;
pub mod table;

pub use bundle::{
    read_coordinates, read_inputs, read_results, write_coordinates, write_inputs, write_json,
    write_results, COORDINATE_HEADER,
};
pub use staged::{replace_dir_staged, staged_output_path, write_file_staged};
pub use table::{
    append_records, read_numeric_table, read_records, read_samples, write_numeric_table,
    write_records, write_samples, NumericTable,
};
