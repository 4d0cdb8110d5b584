pub mod midi_csv;
