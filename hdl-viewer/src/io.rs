use cloud_format::PointXyzi;
use eyre::{eyre, Result, WrapErr};
use itertools::Itertools;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Reads every point of a PCD file.
///
/// The file must have `x`, `y` and `z` fields. An `intensity` field of any
/// scalar type is used when present; otherwise intensity is zero.
pub fn load_pcd_points<P>(path: P) -> Result<Vec<PointXyzi>>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let reader = pcd_rs::DynReader::open(path)
        .wrap_err_with(|| format!("unable to open '{}'", path.display()))?;

    let intensity_index = reader
        .meta()
        .field_defs
        .iter()
        .position(|field| field.name == "intensity");

    let points: Vec<_> = reader
        .map(|record| -> Result<_> {
            let record =
                record.wrap_err_with(|| format!("corrupted record in '{}'", path.display()))?;
            let [x, y, z] = record
                .to_xyz()
                .ok_or_else(|| eyre!("No x, y or z field found in '{}'", path.display()))?;
            let intensity = intensity_index
                .and_then(|index| record.0.get(index))
                .and_then(first_as_f32)
                .unwrap_or(0.0);

            Ok(PointXyzi::new(x, y, z, intensity))
        })
        .try_collect()?;

    Ok(points)
}

fn first_as_f32(field: &pcd_rs::Field) -> Option<f32> {
    use pcd_rs::Field as F;

    let value = match field {
        F::I8(values) => *values.first()? as f32,
        F::I16(values) => *values.first()? as f32,
        F::I32(values) => *values.first()? as f32,
        F::U8(values) => *values.first()? as f32,
        F::U16(values) => *values.first()? as f32,
        F::U32(values) => *values.first()? as f32,
        F::F32(values) => *values.first()?,
        F::F64(values) => *values.first()? as f32,
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(value)
}

/// Lists the `.pcd` files directly inside `dir`, sorted by file name.
pub fn list_pcd_files<P>(dir: P) -> Result<Vec<PathBuf>>
where
    P: AsRef<Path>,
{
    let dir = dir.as_ref();
    let entries =
        fs::read_dir(dir).wrap_err_with(|| format!("unable to list '{}'", dir.display()))?;

    let mut files: Vec<PathBuf> = entries
        .map(|entry| -> Result<_> { Ok(entry?.path()) })
        .filter_ok(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "pcd"))
        .try_collect()?;
    files.sort();

    Ok(files)
}
