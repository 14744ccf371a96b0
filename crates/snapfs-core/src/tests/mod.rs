mod vfs;
