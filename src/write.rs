use serde::Serialize;

/// Basic CSV exporter for any of the derived reports. The header comes from
/// the row type's field names; an empty report writes nothing at all.
pub fn write_report<W: std::io::Write, T: Serialize>(
    writer: W,
    rows: &[T],
) -> Result<(), anyhow::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}
